use minijinja::Environment;
use serde::Serialize;

pub const GENERATE_TEMPLATE: &str = "generate.html";

/// Static usage page served on `GET /`.
pub const INDEX_PAGE: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/templates/index.html"
));

const GENERATE_SOURCE: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/templates/generate.html"
));

/// Values shown on the result page.
#[derive(Debug, Serialize)]
pub struct GenerationView<'a> {
    pub prompt: &'a str,
    pub generated_code: &'a str,
}

pub struct Templates {
    env: Environment<'static>,
}

impl Templates {
    /// Compiles the built-in templates. `.html` names get HTML auto-escaping.
    pub fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.add_template(GENERATE_TEMPLATE, GENERATE_SOURCE)?;
        Ok(Self { env })
    }

    pub fn render_generation(&self, view: &GenerationView<'_>) -> Result<String, minijinja::Error> {
        self.env.get_template(GENERATE_TEMPLATE)?.render(view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(prompt: &str, generated_code: &str) -> String {
        Templates::new()
            .unwrap()
            .render_generation(&GenerationView {
                prompt,
                generated_code,
            })
            .unwrap()
    }

    #[test]
    fn interpolates_both_regions() {
        let html = render("fn main()", "fn main() {}");
        assert!(html.contains(r#"<pre id="prompt">fn main()</pre>"#));
        assert!(html.contains(r#"<pre id="generated-code">fn main() {}</pre>"#));
        assert!(html.contains("<title>Code Generation API</title>"));
    }

    #[test]
    fn markup_in_values_is_escaped() {
        let html = render("<script>alert(1)</script>", "a & b");
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("a &amp; b"));
    }

    #[test]
    fn index_page_documents_request_body() {
        assert!(INDEX_PAGE.contains("<code>/generate</code>"));
        assert!(INDEX_PAGE.contains(r#""prompt": "def hello_world():\n    print('Hello, World!')""#));
    }
}
