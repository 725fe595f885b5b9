//! Stack output cache
//!
//! Output specs have the form `stack:key` or `stack:child:key`. A child
//! reference names an output of the parent stack (suffixed with `Stack`)
//! whose value is a stack id like `arn:.../<child-stack-name>/<uuid>`; the
//! second `/`-delimited segment is the child stack's name.
//!
//! Outputs are fetched once per stack and kept for the life of the cache.

use crate::error::{CoreError, Result};
use nodeflow_cloud::OutputProvider;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

const CHILD_SUFFIX: &str = "Stack";

pub type Outputs = Arc<HashMap<String, String>>;

/// Session-scoped memo of stack outputs
pub struct OutputCache {
    provider: Arc<dyn OutputProvider>,
    stack_prefix: Option<String>,
    cache: Mutex<HashMap<String, Outputs>>,
}

impl OutputCache {
    pub fn new(provider: Arc<dyn OutputProvider>, stack_prefix: Option<String>) -> Self {
        Self {
            provider,
            stack_prefix: stack_prefix.filter(|p| !p.is_empty()),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Outputs of `parent` or, for `parent:child`, of the chained child stack
    pub async fn outputs(&self, spec: &str) -> Result<Outputs> {
        let (parent, child) = match spec.split_once(':') {
            Some((parent, child)) => (parent, Some(child)),
            None => (spec, None),
        };

        let outputs = self.stack_outputs(parent).await?;
        let Some(child) = child else {
            return Ok(outputs);
        };

        let child_key = if child.ends_with(CHILD_SUFFIX) {
            child.to_string()
        } else {
            format!("{child}{CHILD_SUFFIX}")
        };
        let child_stack = outputs
            .get(&child_key)
            .and_then(|id| id.split('/').nth(1))
            .ok_or_else(|| CoreError::OutputNotFound(format!("{parent}:{child_key}")))?
            .to_string();

        self.stack_outputs(&child_stack).await
    }

    /// A single output value; `None` when the stack has no such output
    pub async fn output(&self, spec: &str) -> Result<Option<String>> {
        let Some((stacks, key)) = spec.rsplit_once(':') else {
            return Err(CoreError::OutputNotFound(spec.to_string()));
        };
        let outputs = self.outputs(stacks).await?;
        Ok(outputs.get(key).cloned())
    }

    /// Number of stacks fetched so far
    pub async fn len(&self) -> usize {
        self.cache.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cache.lock().await.is_empty()
    }

    fn stack_name(&self, stack: &str) -> String {
        match &self.stack_prefix {
            Some(prefix) if !stack.starts_with(prefix.as_str()) => format!("{prefix}{stack}"),
            _ => stack.to_string(),
        }
    }

    async fn stack_outputs(&self, stack: &str) -> Result<Outputs> {
        let name = self.stack_name(stack);
        if let Some(cached) = self.cache.lock().await.get(&name) {
            return Ok(cached.clone());
        }

        tracing::debug!("Fetching outputs for stack {}", name);
        let outputs = Arc::new(self.provider.outputs(&name).await?);
        self.cache.lock().await.insert(name, outputs.clone());
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeOutputs {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl OutputProvider for FakeOutputs {
        async fn outputs(&self, stack: &str) -> nodeflow_cloud::Result<HashMap<String, String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let pairs: &[(&str, &str)] = match stack {
                "prod-network" => &[
                    ("VpcId", "vpc-1"),
                    (
                        "SubnetsStack",
                        "arn:aws:cloudformation:us-east-1:1:stack/prod-network-subnets/abc",
                    ),
                ],
                "prod-network-subnets" => &[("PublicSubnetA", "subnet-a")],
                other => {
                    return Err(nodeflow_cloud::CloudError::NotFound(format!("stack {other}")));
                }
            };
            Ok(pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect())
        }
    }

    fn cache() -> (Arc<FakeOutputs>, OutputCache) {
        let provider = Arc::new(FakeOutputs {
            calls: AtomicUsize::new(0),
        });
        let cache = OutputCache::new(provider.clone(), Some("prod-".to_string()));
        (provider, cache)
    }

    #[tokio::test]
    async fn test_output_with_prefix() {
        let (provider, cache) = cache();
        assert_eq!(
            cache.output("network:VpcId").await.unwrap().as_deref(),
            Some("vpc-1")
        );
        assert_eq!(cache.output("network:Missing").await.unwrap(), None);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_child_stack_chaining() {
        let (provider, cache) = cache();
        assert_eq!(
            cache
                .output("network:Subnets:PublicSubnetA")
                .await
                .unwrap()
                .as_deref(),
            Some("subnet-a")
        );
        cache
            .output("network:SubnetsStack:PublicSubnetA")
            .await
            .unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn test_missing_child_reference() {
        let (_, cache) = cache();
        assert!(matches!(
            cache.output("network:Nope:Key").await,
            Err(CoreError::OutputNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_provider_error_propagates() {
        let (_, cache) = cache();
        assert!(matches!(
            cache.output("unknown:Key").await,
            Err(CoreError::Cloud(nodeflow_cloud::CloudError::NotFound(_)))
        ));
    }
}
