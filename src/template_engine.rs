use crate::popup::PopupView;
use anyhow::Result;
use std::path::PathBuf;
use tera::{Context, Tera};

const BUILTIN_TEMPLATES: [(&str, &str); 6] = [
    ("popup/base.html", include_str!("../data/templates/popup/base.html")),
    ("popup/details.html", include_str!("../data/templates/popup/details.html")),
    ("popup/caving.html", include_str!("../data/templates/popup/caving.html")),
    ("popup/climbing.html", include_str!("../data/templates/popup/climbing.html")),
    ("popup/basic.html", include_str!("../data/templates/popup/basic.html")),
    ("popup/generic.html", include_str!("../data/templates/popup/generic.html")),
];

pub struct TemplateEngine {
    tera: Tera,
}

impl TemplateEngine {
    /// Built-in popup templates, overridden by same-named files under
    /// `override_dir` (e.g. `<dir>/popup/caving.html`).
    pub fn new(override_dir: Option<PathBuf>) -> Result<Self> {
        let mut builtin = Tera::default();
        builtin.add_raw_templates(BUILTIN_TEMPLATES)?;

        let tera = match override_dir {
            Some(dir) if dir.exists() => {
                let pattern = format!("{}/**/*.html", dir.to_string_lossy());
                let mut tera = match Tera::parse(&pattern) {
                    Ok(t) => t,
                    Err(e) => {
                        if e.to_string().contains("match any files") {
                            Tera::default()
                        } else {
                            return Err(e.into());
                        }
                    }
                };
                // Templates already loaded from the directory win.
                tera.extend(&builtin)?;
                tracing::info!("popup templates loaded from {}", dir.display());
                tera
            }
            Some(dir) => {
                tracing::warn!("template dir {} does not exist, using built-in templates", dir.display());
                builtin
            }
            None => builtin,
        };

        Ok(Self { tera })
    }

    pub fn render_popup(&self, view: &PopupView) -> Result<String> {
        let mut context = Context::new();
        context.insert("popup", view);
        let template = view.template.template_name();
        self.tera.render(template, &context).map_err(|e| {
            let loaded = self.tera.get_template_names().collect::<Vec<_>>();
            anyhow::anyhow!("Tera Render Error: {:?}. Requested: '{}'. Loaded: {:?}", e, template, loaded)
        })
    }
}
