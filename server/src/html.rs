//! Page web embarquée: formulaire d'upload et affichage du résultat.

/// Résultat affiché après une prédiction
pub struct ResultView {
    pub label: String,
    /// (nom de classe, score) dans l'ordre du modèle
    pub scores: Vec<(String, f32)>,
    pub preview_href: String,
}

const PAGE_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="fr">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Classification d'échographies</title>
<style>
  :root {
    --bg: #0d0d0d; --panel: #161616; --border: #2a2a2a;
    --accent: #4a90d9; --text: #e0e0e0; --muted: #666;
    --ok: #4caf50; --err: #e53935; --font: 'Courier New', monospace;
  }
  * { box-sizing: border-box; margin: 0; padding: 0; }
  body {
    background: var(--bg); color: var(--text); font-family: var(--font);
    font-size: 14px; display: flex; justify-content: center; padding: 40px 16px;
  }
  main { width: 100%; max-width: 560px; }
  h1 { font-size: 20px; color: var(--accent); letter-spacing: 1px; margin-bottom: 4px; }
  p.sub { color: var(--muted); margin-bottom: 24px; }
  .panel {
    background: var(--panel); border: 1px solid var(--border);
    border-radius: 6px; padding: 20px; margin-bottom: 20px;
  }
  input[type=file] { color: var(--text); margin-bottom: 14px; width: 100%; }
  button {
    background: none; border: 1px solid var(--accent); color: var(--accent);
    padding: 8px 22px; cursor: pointer; border-radius: 3px;
    font-family: var(--font); font-size: 14px;
  }
  button:hover { background: rgba(74,144,217,0.12); }
  .label { font-size: 18px; color: var(--ok); margin-bottom: 12px; }
  .error { color: var(--err); }
  table { width: 100%; border-collapse: collapse; margin-bottom: 14px; }
  td { padding: 4px 8px; border-bottom: 1px solid var(--border); }
  td.score { text-align: right; color: var(--accent); }
  img.preview { max-width: 100%; border: 1px solid var(--border); border-radius: 4px; }
</style>
</head>
<body>
<main>
  <h1>🩺 Classification d'échographies</h1>
  <p class="sub">benign / malignant / normal — réseau à capsules</p>
  <div class="panel">
    <form action="/predict" method="post" enctype="multipart/form-data">
      <input type="file" name="file" accept="image/*" required>
      <button type="submit">Analyser</button>
    </form>
  </div>
{{content}}
</main>
</body>
</html>
"#;

/// Rend la page; `result` vide pour le formulaire seul
pub fn render_page(result: Option<&ResultView>) -> String {
    let content = match result {
        None => String::new(),
        Some(view) => {
            let mut rows = String::new();
            for (name, score) in &view.scores {
                rows.push_str(&format!(
                    "      <tr><td>{name}</td><td class=\"score\">{score:.4}</td></tr>\n"
                ));
            }
            format!(
                "  <div class=\"panel\">\n    <div class=\"label\">Résultat: {}</div>\n    <table>\n{rows}    </table>\n    <img class=\"preview\" src=\"{}\" alt=\"aperçu\">\n  </div>\n",
                view.label, view.preview_href
            )
        }
    };

    PAGE_TEMPLATE.replace("{{content}}", &content)
}

pub fn render_error(message: &str) -> String {
    let content = format!(
        "  <div class=\"panel\">\n    <div class=\"error\">⚠️ {message}</div>\n  </div>\n"
    );
    PAGE_TEMPLATE.replace("{{content}}", &content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_page_has_upload_field() {
        let page = render_page(None);
        assert!(page.contains("multipart/form-data"));
        assert!(page.contains("name=\"file\""));
        assert!(!page.contains("{{content}}"));
    }

    #[test]
    fn test_result_page_shows_label_and_scores() {
        let view = ResultView {
            label: "malignant".into(),
            scores: vec![
                ("benign".into(), 0.12),
                ("malignant".into(), 0.87),
                ("normal".into(), 0.05),
            ],
            preview_href: "/static/uploaded_image.png".into(),
        };

        let page = render_page(Some(&view));

        assert!(page.contains("Résultat: malignant"));
        assert!(page.contains("0.8700"));
        assert!(page.contains("/static/uploaded_image.png"));
    }

    #[test]
    fn test_error_page_shows_message() {
        let page = render_error("image invalide: octets corrompus");
        assert!(page.contains("image invalide"));
    }
}
