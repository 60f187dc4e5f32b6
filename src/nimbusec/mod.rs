pub mod client;
pub mod error;
#[cfg(test)]
pub mod fake;
pub mod oauth;
pub mod types;

use std::future::Future;

pub use client::{DEFAULT_API, EMPTY_FILTER, NimbusecClient};
pub use error::ApiError;
pub use types::{Domain, ScanResult};

/// Remote operations the batch jobs and commands depend on.
///
/// Implemented by [`NimbusecClient`]; tests swap in an in-memory fake.
pub trait NimbusecApi: Send + Sync + 'static {
    /// Lists domains matching `filter`; [`EMPTY_FILTER`] lists all of them.
    fn find_domains(
        &self,
        filter: &str,
    ) -> impl Future<Output = Result<Vec<Domain>, ApiError>> + Send;

    fn get_domain_by_name(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Domain, ApiError>> + Send;

    /// Creates the domain, updating the remote copy if it already exists.
    fn create_or_update_domain(
        &self,
        domain: &Domain,
    ) -> impl Future<Output = Result<Domain, ApiError>> + Send;

    /// Creates the domain, returning the remote copy untouched if it already exists.
    fn create_or_get_domain(
        &self,
        domain: &Domain,
    ) -> impl Future<Output = Result<Domain, ApiError>> + Send;

    /// With `clean` the data is removed, otherwise only marked as deleted.
    fn delete_domain(
        &self,
        domain: &Domain,
        clean: bool,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn find_infected(
        &self,
        filter: &str,
    ) -> impl Future<Output = Result<Vec<Domain>, ApiError>> + Send;

    fn find_results(
        &self,
        domain: i64,
        filter: &str,
    ) -> impl Future<Output = Result<Vec<ScanResult>, ApiError>> + Send;
}
