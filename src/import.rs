//! Leitura do CSV de entrada (sem cabeçalho, largura variável).
//!
//! Cada linha segue o formato `(nome, docroot, scheme, bundle, deep-link?)`.
//! Comandos diferentes usam colunas diferentes: `rm` só precisa do nome,
//! `agent-config` do nome e docroot, `sync` das quatro primeiras.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord};

use crate::error::AppError;
use crate::nimbusec::Domain;

/// Uma linha do CSV já validada.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainRow {
    pub name: String,
    pub scheme: String,
    pub bundle: String,
    pub deep_link: Option<String>,
}

/// Lê todas as linhas de `reader`; linhas vazias são ignoradas pelo `csv`.
pub fn read_records<R: Read>(reader: R) -> Result<Vec<StringRecord>, AppError> {
    let mut csv = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);
    let records = csv.records().collect::<Result<Vec<_>, _>>()?;
    tracing::debug!(rows = records.len(), "read CSV input");
    Ok(records)
}

pub fn open(path: &Path) -> Result<Vec<StringRecord>, AppError> {
    let file = File::open(path).map_err(|source| AppError::Open {
        path: path.display().to_string(),
        source,
    })?;
    read_records(file)
}

// Número da linha (base 1) para mensagens de erro.
fn line_of(record: &StringRecord, index: usize) -> u64 {
    record
        .position()
        .map(|p| p.line())
        .unwrap_or(index as u64 + 1)
}

/// Coluna obrigatória `col` da linha `index`.
pub fn column<'r>(
    record: &'r StringRecord,
    index: usize,
    col: usize,
    label: &'static str,
) -> Result<&'r str, AppError> {
    record.get(col).ok_or_else(|| AppError::Input {
        line: line_of(record, index),
        reason: format!("missing {label} column"),
    })
}

/// Nome do domínio (coluna 0), rejeitando valores vazios.
pub fn name(record: &StringRecord, index: usize) -> Result<&str, AppError> {
    let name = column(record, index, 0, "name")?;
    if name.trim().is_empty() {
        return Err(AppError::Input {
            line: line_of(record, index),
            reason: "empty domain name".to_string(),
        });
    }
    Ok(name)
}

impl DomainRow {
    pub fn parse(record: &StringRecord, index: usize) -> Result<Self, AppError> {
        let deep_link = record
            .get(4)
            .filter(|link| !link.is_empty())
            .map(str::to_string);

        let name = name(record, index)?.to_string();
        // docroot: required, unused by sync.
        column(record, index, 1, "docroot")?;

        Ok(Self {
            name,
            scheme: column(record, index, 2, "scheme")?.to_string(),
            bundle: column(record, index, 3, "bundle")?.to_string(),
            deep_link,
        })
    }

    /// Entry point of the scans: `scheme://name`, extended by a deep link
    /// that starts with `/`, or replaced by any other deep link.
    pub fn scan_url(&self) -> String {
        let base = format!("{}://{}", self.scheme, self.name);
        match self.deep_link.as_deref() {
            None => base,
            Some(path) if path.starts_with('/') => format!("{base}{path}"),
            Some(url) => url.to_string(),
        }
    }

    pub fn to_domain(&self) -> Domain {
        let url = self.scan_url();
        Domain {
            id: None,
            bundle: self.bundle.clone(),
            name: self.name.clone(),
            scheme: self.scheme.clone(),
            deep_scan: url.clone(),
            fast_scans: vec![url],
        }
    }
}

/// Converte todas as linhas, parando na primeira inválida.
pub fn domain_rows(records: &[StringRecord]) -> Result<Vec<DomainRow>, AppError> {
    records
        .iter()
        .enumerate()
        .map(|(i, record)| DomainRow::parse(record, i))
        .collect()
}
