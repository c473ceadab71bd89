use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use capsnet_model::preprocess;

use crate::error::AppError;
use crate::html::{self, ResultView};
use crate::state::AppState;

/// Taille maximale d'un upload (les échographies tiennent largement dessous)
const MAX_UPLOAD_BYTES: usize = 8 * 1024 * 1024;

/// Nom de fichier de l'aperçu, écrasé à chaque prédiction
const PREVIEW_FILE: &str = "uploaded_image.png";

pub fn create_router(state: AppState) -> Router {
    let static_dir = state.config().static_dir.clone();

    Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        .route("/predict", post(predict))
        .nest_service("/static", ServeDir::new(static_dir))
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn home() -> Html<String> {
    Html(html::render_page(None))
}

async fn health() -> impl IntoResponse {
    "ok"
}

/// Reçoit l'image en multipart, lance l'inférence, écrit l'aperçu et rend la
/// page de résultat. Une image illisible donne un 400, jamais un crash.
async fn predict(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Html<String>, AppError> {
    let mut upload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidRequest(e.to_string()))?
    {
        if field.name() == Some("file") {
            upload = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| AppError::InvalidRequest(e.to_string()))?,
            );
        }
    }

    let bytes = upload.ok_or_else(|| AppError::InvalidRequest("champ `file` manquant".into()))?;
    if bytes.is_empty() {
        return Err(AppError::InvalidRequest("fichier vide".into()));
    }

    let preview_path = state.config().static_dir.join(PREVIEW_FILE);
    let worker = state.clone();

    // L'inférence est du calcul pur: hors de l'exécuteur async
    let prediction = tokio::task::spawn_blocking(move || -> Result<_, AppError> {
        let image = preprocess::decode(&bytes)?;
        let tensor = preprocess::to_tensor(&image, &worker.model().config);
        let mut predictions = worker.model().predict(&tensor.view())?;

        image
            .to_rgb8()
            .save(&preview_path)
            .map_err(|e| AppError::Internal(format!("écriture de l'aperçu: {e}")))?;

        Ok(predictions.remove(0))
    })
    .await
    .map_err(|e| AppError::Internal(format!("tâche d'inférence: {e}")))??;

    info!(
        label = %prediction.label,
        score = prediction.scores[prediction.class_index],
        "prédiction servie"
    );

    let view = ResultView {
        label: prediction.label,
        scores: state
            .model()
            .config
            .class_names
            .iter()
            .cloned()
            .zip(prediction.scores.iter().copied())
            .collect(),
        preview_href: format!("/static/{PREVIEW_FILE}"),
    };

    Ok(Html(html::render_page(Some(&view))))
}
