use std::collections::BTreeMap;
use std::io::Write;

use csv::StringRecord;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::import;

/// Configuration file consumed by the nimbusec server agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    pub key: String,
    pub secret: String,
    /// Domain URL → document root on this server.
    pub domains: BTreeMap<String, String>,
    #[serde(rename = "tmpfile")]
    pub tmp_file: String,
    pub exclude_dir: Vec<String>,
    pub exclude_regexp: Vec<String>,
    #[serde(rename = "apiserver")]
    pub api_server: String,
}

impl AgentConfig {
    /// Maps column 0 (url) to column 1 (docroot); rows with an empty url are skipped.
    pub fn from_records(
        records: &[StringRecord],
        key: &str,
        secret: &str,
        tmp_file: &str,
        api_server: &str,
    ) -> Result<Self, AppError> {
        let mut domains = BTreeMap::new();
        for (index, record) in records.iter().enumerate() {
            let url = import::column(record, index, 0, "url")?;
            if url.is_empty() {
                continue;
            }
            let docroot = import::column(record, index, 1, "docroot")?;
            domains.insert(url.to_string(), docroot.to_string());
        }

        Ok(Self {
            key: key.to_string(),
            secret: secret.to_string(),
            domains,
            tmp_file: tmp_file.to_string(),
            exclude_dir: Vec::new(),
            exclude_regexp: Vec::new(),
            api_server: api_server.to_string(),
        })
    }

    /// Writes tab-indented JSON followed by a newline.
    pub fn write_to<W: Write>(&self, mut out: W) -> Result<(), AppError> {
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        self.serialize(&mut serializer)?;
        out.write_all(b"\n")?;
        Ok(())
    }
}
