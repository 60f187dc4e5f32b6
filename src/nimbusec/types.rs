//! Tipos de dados trocados com a API REST do nimbusec (`/v2`).
//!
//! Todas as structs derivam `Serialize` e `Deserialize` com nomes de campo
//! em camelCase, conforme o formato JSON esperado pelo servidor.

use serde::{Deserialize, Serialize};

/// Um domínio monitorado (normalmente um nome DNS).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Domain {
    /// Identificador único atribuído pelo servidor. Ausente ao criar.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// ID do bundle atribuído.
    #[serde(default)]
    pub bundle: String,
    /// Nome do domínio.
    pub name: String,
    /// "http" ou "https".
    #[serde(default)]
    pub scheme: String,
    /// Ponto de partida do deep scan.
    #[serde(default)]
    pub deep_scan: String,
    /// Páginas de entrada verificadas pelos fast scans.
    #[serde(default)]
    pub fast_scans: Vec<String>,
}

/// Um achado do serviço que requer ação do usuário.
///
/// Nem todos os campos de detalhe vêm preenchidos; os ausentes assumem o
/// valor padrão.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScanResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// 1 = pending, 2 = acknowledged, 3 = falsepositive, 4 = removed.
    pub status: i32,
    pub event: String,
    pub category: String,
    /// 1 (médio) a 3 (severo).
    pub severity: i32,
    pub probability: f64,
    pub safe_to_delete: bool,
    /// Timestamp em milissegundos da primeira ocorrência.
    pub create_date: i64,
    /// Timestamp em milissegundos da última ocorrência.
    pub last_date: i64,
    #[serde(rename = "threatname")]
    pub threat_name: String,
    pub resource: String,
    pub md5: String,
    pub filesize: i64,
    pub reason: String,
}
