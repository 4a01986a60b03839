//! Descriptors naming a trait instance on a resource.

use crate::ResourceIdentifier;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Everything a backend needs to locate a trait instance: the owning
/// resource, the trait's profile id, the instance id, and the root path
/// of the data sink within the trait schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraitDescriptor {
    pub resource: ResourceIdentifier,
    pub profile_id: u32,
    pub instance_id: u64,
    pub path: String,
}

impl TraitDescriptor {
    /// Describes instance `instance_id` of `profile_id` on the local node,
    /// rooted at `/`.
    #[must_use]
    pub fn new(profile_id: u32, instance_id: u64) -> Self {
        Self {
            resource: ResourceIdentifier::self_node(),
            profile_id,
            instance_id,
            path: "/".to_string(),
        }
    }

    /// Sets the owning resource.
    #[must_use]
    pub fn with_resource(mut self, resource: ResourceIdentifier) -> Self {
        self.resource = resource;
        self
    }

    /// Sets the root path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }
}

impl fmt::Display for TraitDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:#010x}/{}@{}{}",
            self.profile_id, self.instance_id, self.resource, self.path
        )
    }
}
