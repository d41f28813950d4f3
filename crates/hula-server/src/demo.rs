//! A small todo application served when no other routes are configured.
//!
//! `/todo` lays out the page and `/todo/list` renders the items taken from
//! the `items` query value, either a JSON array or a comma separated string.

use hula_core::{Component, Composer, Rendering, RouteTable, State, Value};
use serde_json::Value as Json;

/// The demo route table.
#[must_use]
pub fn routes() -> RouteTable {
    RouteTable::new()
        .route("/", |app, _| Ok(Home { app }))
        .route("/todo", |app, _| Ok(TodoPage { app }))
        .route("/todo/list", |_, state| Ok(TodoList::from_state(&state)))
}

struct Home {
    app: Composer,
}

impl Component for Home {
    fn render(&self, _child: Option<String>) -> Option<Rendering> {
        let links: Vec<String> = self
            .app
            .subroutes()
            .filter(|suffix| !suffix.contains('/'))
            .map(|suffix| format!("<li><a href=\"/{0}\">{0}</a></li>", suffix))
            .collect();

        Some(Rendering::from(format!("<nav><ul>{}</ul></nav>", links.concat())))
    }
}

struct TodoPage {
    app: Composer,
}

impl Component for TodoPage {
    fn render(&self, child: Option<String>) -> Option<Rendering> {
        // rendered directly, the page pulls in its own list
        let body: Value = match child {
            Some(html) => html.into(),
            None => self.app.sub("/list").into(),
        };

        let template = self
            .app
            .template()
            .text("<section class=\"todo\"><h1>Todos</h1>")
            .value(body)
            .text("</section>");

        Some(Rendering::deferred(async move { Ok(template.resolve().await?) }))
    }
}

struct TodoList {
    items: Vec<String>,
}

impl TodoList {
    fn from_state(state: &State) -> Self {
        let items = match state.get("items") {
            Some(Json::Array(values)) => values
                .iter()
                .map(|value| match value {
                    Json::String(text) => text.clone(),
                    other => other.to_string(),
                })
                .collect(),
            Some(Json::String(text)) => text
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        };
        Self { items }
    }
}

impl Component for TodoList {
    fn render(&self, _child: Option<String>) -> Option<Rendering> {
        if self.items.is_empty() {
            return Some(Rendering::from("<p class=\"empty\">Nothing to do</p>"));
        }

        let items: Value = self
            .items
            .iter()
            .map(|item| format!("<li>{}</li>", escape(item)))
            .collect();
        let count = self.items.len();

        Some(Rendering::deferred(async move {
            let list = hula_core::Template::new()
                .text("<ul>")
                .value(items)
                .text("</ul><p>")
                .value(count)
                .text(" left</p>");
            Ok(list.resolve().await?)
        }))
    }
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
