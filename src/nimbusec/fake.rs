//! In-memory stand-in for the remote API, used by job and command tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};

use super::{ApiError, Domain, NimbusecApi, ScanResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    FindDomains(String),
    GetByName(String),
    CreateOrUpdate(Domain),
    CreateOrGet(Domain),
    Delete { name: String, clean: bool },
    FindInfected(String),
    FindResults { domain: i64, filter: String },
}

#[derive(Default)]
pub struct FakeApi {
    domains: Mutex<Vec<Domain>>,
    infected: Vec<Domain>,
    results: HashMap<i64, Vec<ScanResult>>,
    failing: HashSet<String>,
    calls: Mutex<Vec<Call>>,
    next_id: AtomicI64,
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1000),
            ..Self::default()
        }
    }

    /// Seeds remote domains named `names` with ids 1, 2, ...
    pub fn with_domains(names: &[&str]) -> Self {
        let fake = Self::new();
        {
            let mut domains = fake.domains.lock().unwrap();
            for (i, name) in names.iter().enumerate() {
                domains.push(Domain {
                    id: Some(i as i64 + 1),
                    name: (*name).to_string(),
                    scheme: "https".into(),
                    bundle: "bundle1".into(),
                    ..Domain::default()
                });
            }
        }
        fake
    }

    /// Every call touching `name` fails with a 500.
    pub fn failing_on(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    pub fn with_infected(mut self, domains: Vec<Domain>) -> Self {
        self.infected = domains;
        self
    }

    pub fn with_results(mut self, domain: i64, results: Vec<ScanResult>) -> Self {
        self.results.insert(domain, results);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn remote_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .domains
            .lock()
            .unwrap()
            .iter()
            .map(|d| d.name.clone())
            .collect();
        names.sort();
        names
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn check(&self, name: &str) -> Result<(), ApiError> {
        if self.failing.contains(name) {
            return Err(ApiError::Api {
                status: 500,
                message: format!("injected failure for {name}"),
            });
        }
        Ok(())
    }

    fn upsert(&self, domain: &Domain, overwrite: bool) -> Domain {
        let mut domains = self.domains.lock().unwrap();
        if let Some(existing) = domains.iter_mut().find(|d| d.name == domain.name) {
            if overwrite {
                *existing = Domain {
                    id: existing.id,
                    ..domain.clone()
                };
            }
            return existing.clone();
        }
        let created = Domain {
            id: Some(self.next_id.fetch_add(1, Ordering::SeqCst)),
            ..domain.clone()
        };
        domains.push(created.clone());
        created
    }
}

impl NimbusecApi for FakeApi {
    async fn find_domains(&self, filter: &str) -> Result<Vec<Domain>, ApiError> {
        self.record(Call::FindDomains(filter.to_string()));
        Ok(self.domains.lock().unwrap().clone())
    }

    async fn get_domain_by_name(&self, name: &str) -> Result<Domain, ApiError> {
        self.record(Call::GetByName(name.to_string()));
        self.check(name)?;
        self.domains
            .lock()
            .unwrap()
            .iter()
            .chain(self.infected.iter())
            .find(|d| d.name == name)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(name.to_string()))
    }

    async fn create_or_update_domain(&self, domain: &Domain) -> Result<Domain, ApiError> {
        self.record(Call::CreateOrUpdate(domain.clone()));
        self.check(&domain.name)?;
        Ok(self.upsert(domain, true))
    }

    async fn create_or_get_domain(&self, domain: &Domain) -> Result<Domain, ApiError> {
        self.record(Call::CreateOrGet(domain.clone()));
        self.check(&domain.name)?;
        Ok(self.upsert(domain, false))
    }

    async fn delete_domain(&self, domain: &Domain, clean: bool) -> Result<(), ApiError> {
        self.record(Call::Delete {
            name: domain.name.clone(),
            clean,
        });
        self.check(&domain.name)?;
        self.domains
            .lock()
            .unwrap()
            .retain(|d| d.id != domain.id || d.name != domain.name);
        Ok(())
    }

    async fn find_infected(&self, filter: &str) -> Result<Vec<Domain>, ApiError> {
        self.record(Call::FindInfected(filter.to_string()));
        Ok(self.infected.clone())
    }

    async fn find_results(&self, domain: i64, filter: &str) -> Result<Vec<ScanResult>, ApiError> {
        self.record(Call::FindResults {
            domain,
            filter: filter.to_string(),
        });
        let name = self
            .infected
            .iter()
            .find(|d| d.id == Some(domain))
            .map(|d| d.name.clone())
            .unwrap_or_default();
        self.check(&name)?;
        Ok(self.results.get(&domain).cloned().unwrap_or_default())
    }
}
