//! HTML page rendering
//!
//! A single minijinja template, embedded at compile time, with HTML
//! auto-escaping and a `join` helper for string lists.

use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;

use crate::service::UserProfile;

const INDEX_TEMPLATE: &str = "index.html";

/// Data the index page may show. Tokens never belong here.
#[derive(Debug, Serialize)]
pub struct IndexView<'a> {
    pub user: Option<&'a UserProfile>,
    pub scopes: &'a [String],
}

impl IndexView<'_> {
    /// Login page: no identity data
    pub fn anonymous() -> Self {
        IndexView {
            user: None,
            scopes: &[],
        }
    }
}

pub struct PageRenderer {
    env: Environment<'static>,
}

impl PageRenderer {
    pub fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.add_function("join", join);
        env.add_template(INDEX_TEMPLATE, include_str!("../../templates/index.html"))?;

        Ok(Self { env })
    }

    pub fn render_index(&self, view: &IndexView<'_>) -> Result<String, minijinja::Error> {
        self.env.get_template(INDEX_TEMPLATE)?.render(view)
    }
}

fn join(items: Vec<String>, separator: String) -> String {
    items.join(&separator)
}
