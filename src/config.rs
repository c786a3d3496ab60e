use std::path::Path;

use anyhow::anyhow;
use config::{Config, File};
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct Settings {
    /// Bibliography fields kept on each entry, in documentation order
    pub citation_format: Vec<String>,
    /// Document whose frontmatter declares bibliographies for the whole project
    pub root_file: Option<String>,
    pub default_bib: Option<String>,
    pub default_bibs: Vec<String>,
    pub use_default_bib: bool,
    pub forget_unused_bib: bool,
    pub crossref_mode: CrossRefMode,
    pub lookback_chars: usize,
    pub table_preview_lines: usize,
    pub hover: bool,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, clap::ValueEnum)]
pub enum CrossRefMode {
    Full,
    Minimal,
    None,
}

const DEFAULT_CITATION_FORMAT: [&str; 11] = [
    "author",
    "editor",
    "date",
    "year",
    "title",
    "journal",
    "journaltitle",
    "publisher",
    "booktitle",
    "doi",
    "url",
];

impl Settings {
    pub fn new(root_dir: &Path) -> anyhow::Result<Settings> {
        let expanded = shellexpand::tilde("~/.config/citer/settings");
        let settings = Config::builder()
            .add_source(File::with_name(&expanded).required(false))
            .add_source(
                File::with_name(&format!(
                    "{}/.citer",
                    root_dir
                        .to_str()
                        .ok_or(anyhow!("Can't convert root_dir to str"))?
                ))
                .required(false),
            )
            .set_default("citation_format", DEFAULT_CITATION_FORMAT.to_vec())?
            .set_default("default_bibs", Vec::<String>::new())?
            .set_default("use_default_bib", false)?
            .set_default("forget_unused_bib", true)?
            .set_default("crossref_mode", "Full")?
            .set_default("lookback_chars", 800)?
            .set_default("table_preview_lines", 3)?
            .set_default("hover", true)?
            .build()
            .map_err(|err| anyhow!("Build err: {err}"))?;

        let settings = settings.try_deserialize::<Settings>()?;

        anyhow::Ok(settings)
    }

    /// The allow-list as it is matched against field names.
    pub fn field_allow_list(&self) -> Vec<String> {
        self.citation_format
            .iter()
            .map(|field| field.trim().to_lowercase())
            .filter(|field| !field.is_empty())
            .collect()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            citation_format: DEFAULT_CITATION_FORMAT.map(String::from).to_vec(),
            root_file: None,
            default_bib: None,
            default_bibs: vec![],
            use_default_bib: false,
            forget_unused_bib: true,
            crossref_mode: CrossRefMode::Full,
            lookback_chars: 800,
            table_preview_lines: 3,
            hover: true,
        }
    }
}
