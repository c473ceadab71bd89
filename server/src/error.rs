use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use capsnet_model::ModelError;
use thiserror::Error;

use crate::html;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("requête invalide: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("erreur interne: {0}")]
    Internal(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            // Une image illisible vient de l'utilisateur, pas du serveur
            AppError::Model(ModelError::Image(_)) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(error = %self, "échec du traitement de la requête");
        } else {
            tracing::warn!(error = %self, "requête rejetée");
        }

        (status, Html(html::render_error(&self.to_string()))).into_response()
    }
}
