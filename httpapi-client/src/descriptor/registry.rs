use std::sync::Arc;

use httpapi_core::{ApiError, SingleFlightCache};

use super::{ActionDescriptor, ActionId, MethodSignature};

/// Process-local cache of built descriptors, keyed by [`ActionId`].
///
/// Each descriptor is built exactly once even under concurrent first use.
/// Build failures are not cached; since they come from the signature's
/// shape, a rebuild fails the same way.
#[derive(Debug, Default)]
pub struct DescriptorRegistry {
    cache: SingleFlightCache<ActionId, Arc<ActionDescriptor>>,
}

impl DescriptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_build(
        &self,
        signature: &MethodSignature,
    ) -> Result<Arc<ActionDescriptor>, ApiError> {
        // Only called on a miss.
        self.cache
            .get_or_add(signature.id(), |_| {
                let signature = signature.clone();
                async move { ActionDescriptor::build(&signature).map(Arc::new) }
            })
            .await
    }

    /// The descriptor for `id`, if it has been built.
    pub fn get(&self, id: &ActionId) -> Option<Arc<ActionDescriptor>> {
        self.cache.get(id)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::HttpMethod;
    use crate::descriptor::ParamSignature;

    fn signature() -> MethodSignature {
        MethodSignature::new("IUserApi", "get")
            .behavior(HttpMethod::get("users/{id}"))
            .param(ParamSignature::of::<u64>("id"))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_builds_share_one_descriptor() {
        let registry = Arc::new(DescriptorRegistry::new());
        let tasks: Vec<_> = (0..64)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.get_or_build(&signature()).await.unwrap() })
            })
            .collect();

        let mut descriptors = Vec::new();
        for task in tasks {
            descriptors.push(task.await.unwrap());
        }
        assert!(descriptors.iter().all(|d| Arc::ptr_eq(d, &descriptors[0])));
        assert_eq!(registry.len(), 1);
        assert!(registry.get(&signature().id()).is_some());
    }

    #[tokio::test]
    async fn test_hit_does_not_rebuild() {
        let registry = DescriptorRegistry::new();
        let built = registry.get_or_build(&signature()).await.unwrap();

        // Same id, but building this shape would fail: a hit must not build.
        let hit = registry.get_or_build(&signature().generic()).await.unwrap();
        assert!(Arc::ptr_eq(&built, &hit));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let registry = DescriptorRegistry::new();
        let bad = signature().generic();
        assert!(registry.get_or_build(&bad).await.unwrap_err().is_unsupported_signature());
        assert!(registry.is_empty());
        // Deterministic: a retry fails the same way.
        assert!(registry.get_or_build(&bad).await.is_err());
    }

    #[tokio::test]
    async fn test_identity_includes_parameter_types() {
        let registry = DescriptorRegistry::new();
        let by_id = signature();
        let by_name = MethodSignature::new("IUserApi", "get")
            .behavior(HttpMethod::get("users/{name}"))
            .param(ParamSignature::of::<String>("name"));

        let a = registry.get_or_build(&by_id).await.unwrap();
        let b = registry.get_or_build(&by_name).await.unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 2);
    }
}
