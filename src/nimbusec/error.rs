//! Tipos de erro para o cliente da API nimbusec.
//!
//! Define [`ApiError`] com variantes para respostas de erro do servidor,
//! buscas sem resultado único e falhas de rede. Usa `thiserror` para derivar
//! `Display` e `Error` a partir dos atributos `#[error(...)]`.

use thiserror::Error;

/// Erros que podem ocorrer ao interagir com a API do nimbusec.
#[derive(Debug, Error)]
pub enum ApiError {
    /// O servidor respondeu com status fora da faixa 2xx. A mensagem vem do
    /// cabeçalho `x-nimbusec-error` quando presente, senão do corpo.
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Uma busca por nome não encontrou nenhum domínio.
    #[error("domain not found: {0}")]
    NotFound(String),

    /// Uma busca por nome encontrou mais de um domínio.
    #[error("name {0:?} matched too many domains")]
    Ambiguous(String),

    /// URL base ou caminho inválido.
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Falha ao montar a assinatura OAuth.
    #[error("signing error: {0}")]
    Signing(String),

    /// Falha de rede subjacente (DNS, conexão recusada, timeout) ou corpo
    /// de resposta que não pôde ser decodificado.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}
