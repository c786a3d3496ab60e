use serde::Deserialize;

/// The `bibliography` key may hold one path or a list of them.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
enum BibliographyField {
    One(String),
    Many(Vec<String>),
}

#[derive(Deserialize, Debug, Clone)]
struct RawFrontmatter {
    #[serde(default)]
    bibliography: Option<BibliographyField>,
}

pub fn has_frontmatter(text: &str) -> bool {
    text.trim_start().starts_with("---")
}

/// YAML between the opening `---` and the first line that is only `---`.
pub fn extract_frontmatter(text: &str) -> Option<String> {
    let trimmed = text.trim_start();
    if !trimmed.starts_with("---") {
        return None;
    }

    let lines: Vec<&str> = trimmed.lines().collect();
    let end = lines
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, line)| line.trim() == "---")
        .map(|(i, _)| i)?;

    Some(lines[1..end].join("\n"))
}

/// Bibliography paths declared in a YAML mapping, as written; `None` for invalid YAML.
pub fn bibliography_entries(yaml: &str) -> Option<Vec<String>> {
    let raw: RawFrontmatter = serde_yaml::from_str(yaml).ok()?;

    match raw.bibliography? {
        BibliographyField::One(path) => Some(vec![path]),
        BibliographyField::Many(paths) => Some(paths),
    }
}
