//! HTML bodies of the emails we send, embedded at compile time.

use std::sync::OnceLock;

use tera::{Context, Tera};

const SITE: &str = "cigarettecard.club";

pub const WELCOME_EMAIL: &str = "welcome_email.html";
pub const CARD_BROADCAST: &str = "card_broadcast.html";

/// Parsed once per process; a failed parse is retried on the next render.
fn templates() -> Result<&'static Tera, tera::Error> {
    static TERA: OnceLock<Tera> = OnceLock::new();
    if let Some(tera) = TERA.get() {
        return Ok(tera);
    }

    let mut tera = Tera::default();
    tera.add_raw_templates(vec![
        (
            WELCOME_EMAIL,
            include_str!("../templates/welcome_email.html"),
        ),
        (
            CARD_BROADCAST,
            include_str!("../templates/card_broadcast.html"),
        ),
    ])?;
    Ok(TERA.get_or_init(|| tera))
}

pub fn render(template_name: &str, entries: &[(&str, &str)]) -> Result<String, tera::Error> {
    let mut ctx = Context::new();
    ctx.insert("site", SITE);
    for (key, value) in entries.iter().copied() {
        ctx.insert(key, value);
    }
    templates()?.render(template_name, &ctx)
}
