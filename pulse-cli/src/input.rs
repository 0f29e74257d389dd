//! Input and output documents for the `analyze` command.

use anyhow::{bail, Context, Result};
use pulse_analyzer::{AnalysisRun, Node, NodeAnalysis};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// `{"texts": [...], "nodes": [...]}`
#[derive(Debug, Clone, Deserialize)]
pub struct InputDocument {
    pub texts: Vec<String>,
    pub nodes: Vec<Node>,
}

impl InputDocument {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read input from {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid input in {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let doc: Self = serde_json::from_str(content)?;
        if doc.texts.is_empty() {
            bail!("input has no texts");
        }
        Ok(doc)
    }
}

/// What gets printed or written after a run.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputDocument<'a> {
    pub analyzer: &'a str,
    #[serde(flatten)]
    pub run: &'a AnalysisRun,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Vec<NodeAnalysis>>,
}

impl OutputDocument<'_> {
    pub fn write(&self, path: Option<&Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        match path {
            Some(path) => fs::write(path, json)
                .with_context(|| format!("Failed to write output to {}", path.display())),
            None => {
                println!("{json}");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_document() {
        let doc = InputDocument::parse(
            r#"{
                "texts": ["great service", "too slow"],
                "nodes": [{"id": "A", "name": "Service", "keywords": ["service"]}]
            }"#,
        )
        .unwrap();
        assert_eq!(doc.texts.len(), 2);
        assert_eq!(doc.nodes[0].keywords, vec!["service".to_string()]);
    }

    #[test]
    fn test_rejects_empty_texts() {
        let err = InputDocument::parse(r#"{"texts": [], "nodes": []}"#).unwrap_err();
        assert!(err.to_string().contains("no texts"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"texts": ["fine"], "nodes": [{{"id": "n1", "name": "General"}}]}}"#
        )
        .unwrap();
        let doc = InputDocument::load(file.path()).unwrap();
        assert_eq!(doc.nodes[0].id, "n1");
        assert!(doc.nodes[0].keywords.is_empty());
    }

    #[test]
    fn test_load_missing_file_names_path() {
        let err = InputDocument::load(Path::new("/nonexistent/input.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/input.json"));
    }
}
