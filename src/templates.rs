//! HTML page rendering.

use crate::error::Result;
use axum::response::Html;
use minijinja::Environment;
use serde::Serialize;

const TEMPLATES: &[(&str, &str)] = &[
    ("base.html", include_str!("../templates/base.html")),
    ("form_errors.html", include_str!("../templates/form_errors.html")),
    ("login.html", include_str!("../templates/login.html")),
    ("register.html", include_str!("../templates/register.html")),
    ("book_list.html", include_str!("../templates/book_list.html")),
    ("add_book.html", include_str!("../templates/add_book.html")),
];

/// Compiled page templates. Output is HTML-escaped.
pub struct Templates {
    env: Environment<'static>,
}

impl Templates {
    /// Compile the built-in templates.
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        for &(name, source) in TEMPLATES {
            env.add_template(name, source)?;
        }
        Ok(Self { env })
    }

    /// Render a template with the given context.
    pub fn render(&self, name: &str, ctx: impl Serialize) -> Result<Html<String>> {
        let html = self.env.get_template(name)?.render(ctx)?;
        Ok(Html(html))
    }
}
