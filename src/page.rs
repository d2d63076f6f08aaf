use lesson::SessionSnapshot;
use serde::Serialize;

/// The single page served at `/`.
pub const INDEX_HTML: &str = include_str!("../static/index.html");

const BOOT_MARKER: &str = "/*boot*/null";

#[derive(Serialize)]
struct Boot<'a> {
    session: &'a SessionSnapshot,
    avatar_url: String,
}

/// Render the page with `session` embedded as the script's starting state.
pub fn render(session: &SessionSnapshot) -> anyhow::Result<String> {
    let boot = Boot {
        session,
        avatar_url: format!("/api/sessions/{}/avatar", session.id),
    };
    // `</` would end the script element early.
    let json = serde_json::to_string(&boot)?.replace("</", "<\\/");
    Ok(INDEX_HTML.replacen(BOOT_MARKER, &json, 1))
}
