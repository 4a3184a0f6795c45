use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use sqlx::{Pool, Sqlite};
use tokio::time::Instant;

use super::{ResolvedTemplate, TemplateResolver};
use crate::{store, SandplaneError, SandplaneResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A [`TemplateResolver`] over the database, caching lookups for a fixed time.
///
/// Only the database rows are cached. Access and cluster checks run on every call.
#[derive(Debug)]
pub struct CachedTemplateResolver {
    pool: Pool<Sqlite>,
    ttl: Duration,
    templates: Mutex<HashMap<(String, String), Cached<ResolvedTemplate>>>,
    aliases: Mutex<HashMap<String, Cached<String>>>,
}

#[derive(Debug, Clone)]
struct Cached<T> {
    value: T,
    expires_at: Instant,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl CachedTemplateResolver {
    /// Creates a resolver whose entries live for `ttl`.
    pub fn new(pool: Pool<Sqlite>, ttl: Duration) -> Self {
        Self {
            pool,
            ttl,
            templates: Mutex::new(HashMap::new()),
            aliases: Mutex::new(HashMap::new()),
        }
    }

    async fn load(&self, template_id: &str, tag: &str) -> SandplaneResult<ResolvedTemplate> {
        let key = (template_id.to_string(), tag.to_string());
        if let Some(hit) = fresh(&self.templates, &key) {
            return Ok(hit);
        }

        let not_found =
            || SandplaneError::NotFound(format!("template '{template_id}' with tag '{tag}' not found"));
        let template = store::get_template(&self.pool, template_id)
            .await?
            .ok_or_else(not_found)?;
        let build = store::get_build(&self.pool, template_id, tag)
            .await?
            .ok_or_else(not_found)?;

        let resolved = ResolvedTemplate { template, build };
        self.templates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, Cached::new(resolved.clone(), self.ttl));

        Ok(resolved)
    }
}

impl<T> Cached<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn fresh<K, T>(cache: &Mutex<HashMap<K, Cached<T>>>, key: &K) -> Option<T>
where
    K: std::hash::Hash + Eq,
    T: Clone,
{
    let mut cache = cache.lock().unwrap_or_else(PoisonError::into_inner);
    match cache.get(key) {
        Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
        Some(_) => {
            cache.remove(key);
            None
        }
        None => None,
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl TemplateResolver for CachedTemplateResolver {
    async fn resolve_alias(&self, name: &str, team_id: &str) -> SandplaneResult<String> {
        if let Some(template_id) = fresh(&self.aliases, &name.to_string()) {
            return Ok(template_id);
        }

        let template_id = match store::get_template_id_by_alias(&self.pool, name).await? {
            Some(template_id) => template_id,
            None if store::get_template(&self.pool, name).await?.is_some() => name.to_string(),
            None => {
                tracing::debug!(name, team_id, "template alias not found");
                return Err(SandplaneError::NotFound(format!(
                    "template '{name}' not found"
                )));
            }
        };

        self.aliases
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), Cached::new(template_id.clone(), self.ttl));

        Ok(template_id)
    }

    async fn get(
        &self,
        template_id: &str,
        tag: &str,
        team_id: &str,
        cluster_id: &str,
    ) -> SandplaneResult<ResolvedTemplate> {
        let resolved = self.load(template_id, tag).await?;

        if resolved.template.team_id != team_id && !resolved.template.public {
            return Err(SandplaneError::Forbidden(format!(
                "team '{team_id}' does not have access to the template '{template_id}'"
            )));
        }

        if resolved.build.cluster_id != cluster_id {
            return Err(SandplaneError::InvalidArgument(format!(
                "template '{template_id}' is not available in the requested cluster"
            )));
        }

        Ok(resolved)
    }

    fn invalidate(&self, template_id: &str) {
        self.templates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(id, _), _| id != template_id);
        self.aliases
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|_, entry| entry.value != template_id);

        tracing::debug!(template_id, "template cache invalidated");
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
