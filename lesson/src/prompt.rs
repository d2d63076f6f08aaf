use serde::Serialize;
use tinytemplate::TinyTemplate;

const SYSTEM_TEMPLATE: &str = include_str!("../prompts/system.txt");

/// Instruction asking the model to open a lesson about the current image.
pub const OPENING_PROMPT: &str = include_str!("../prompts/opening.txt");

#[derive(Serialize)]
struct SystemContext<'a> {
    has_image: bool,
    has_objects: bool,
    objects: &'a str,
}

/// Renders a string template using `TinyTemplate` without HTML escaping.
///
/// Values use the `{name}` syntax and blocks use `{{ if name }}`.
pub fn render_template<T: Serialize>(
    template: &str,
    ctx: &T,
) -> Result<String, tinytemplate::error::Error> {
    let mut tt = TinyTemplate::new();
    tt.set_default_formatter(&tinytemplate::format_unescaped);
    tt.add_template("tpl", template)?;
    tt.render("tpl", ctx)
}

/// Build the system instruction for a session.
///
/// Declared on-screen objects are listed together with grounding rules; with
/// none declared the model is told the screen is empty.
pub fn system_prompt(objects: &[String], has_image: bool) -> anyhow::Result<String> {
    let joined = objects.join(", ");
    let ctx = SystemContext {
        has_image,
        has_objects: !objects.is_empty(),
        objects: &joined,
    };
    Ok(render_template(SYSTEM_TEMPLATE, &ctx)?.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Ctx<'a> {
        text: &'a str,
    }

    #[test]
    fn renders_variable_unescaped() {
        let out = render_template("Hello {text}", &Ctx { text: "<world>" }).unwrap();
        assert_eq!(out, "Hello <world>");
    }

    #[test]
    fn lists_objects_with_rules() {
        let prompt = system_prompt(&["apple".into(), "orange".into()], false).unwrap();
        assert!(prompt.starts_with("You are a friendly tutor"));
        assert!(prompt.contains("Objects currently visible on screen: apple, orange"));
        assert!(prompt.contains("never mention where anything is"));
        assert!(!prompt.contains("no objects on screen"));
    }

    #[test]
    fn says_screen_is_empty_without_objects() {
        let prompt = system_prompt(&[], true).unwrap();
        assert!(prompt.contains("There are currently no objects on screen."));
        assert!(prompt.contains("attached picture"));
        assert!(!prompt.contains("Important rules"));
    }
}
