use std::collections::BTreeMap;
use std::sync::Arc;

use metasight_core::{Capability, CapabilityContext, CapabilityError, ToolSpec, Value};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::RegistryBuildError;
use crate::state::USER_INPUT_CAPABILITY;

/// A capability with typed arguments. Its input contract is the JSON schema
/// of `Args`; arguments that do not deserialize are rejected before `run`.
#[async_trait::async_trait]
pub trait TypedCapability: Send + Sync + 'static {
    type Args: DeserializeOwned + JsonSchema + Send;
    type Output: Serialize + Send;

    const NAME: &'static str;
    const DESCRIPTION: &'static str;

    async fn run(
        &self,
        args: Self::Args,
        ctx: &CapabilityContext,
    ) -> Result<Self::Output, CapabilityError>;
}

struct Typed<T> {
    inner: T,
    schema: Value,
}

#[async_trait::async_trait]
impl<T> Capability for Typed<T>
where
    T: TypedCapability,
{
    fn name(&self) -> &str {
        T::NAME
    }

    fn description(&self) -> &str {
        T::DESCRIPTION
    }

    fn input_schema(&self) -> Value {
        self.schema.clone()
    }

    fn validate_arguments(&self, args: &Value) -> bool {
        serde_json::from_value::<T::Args>(args.clone()).is_ok()
    }

    async fn execute(
        &self,
        args: Value,
        ctx: &CapabilityContext,
    ) -> Result<Value, CapabilityError> {
        let typed = serde_json::from_value::<T::Args>(args)
            .map_err(|err| CapabilityError::InvalidArguments(err.to_string()))?;
        let output = self.inner.run(typed, ctx).await?;
        Ok(serde_json::to_value(output)?)
    }
}

/// Read-only, name-indexed set of capabilities. Safe to share across
/// concurrent runs.
#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    entries: BTreeMap<String, Arc<dyn Capability>>,
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("names", &self.names())
            .finish()
    }
}

impl CapabilityRegistry {
    pub fn builder() -> CapabilityRegistryBuilder {
        CapabilityRegistryBuilder::default()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Capability>> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Catalog advertised to the reasoning component, sorted by name.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.entries
            .values()
            .map(|capability| ToolSpec {
                name: capability.name().to_string(),
                description: capability.description().to_string(),
                parameters: capability.input_schema(),
            })
            .collect()
    }
}

#[derive(Default)]
pub struct CapabilityRegistryBuilder {
    entries: Vec<Arc<dyn Capability>>,
}

impl CapabilityRegistryBuilder {
    pub fn register(mut self, capability: Arc<dyn Capability>) -> Self {
        self.entries.push(capability);
        self
    }

    pub fn register_typed<T>(self, capability: T) -> Self
    where
        T: TypedCapability,
    {
        let schema = serde_json::to_value(schemars::schema_for!(T::Args)).unwrap_or(Value::Null);
        self.register(Arc::new(Typed {
            inner: capability,
            schema,
        }))
    }

    pub fn build(self) -> Result<CapabilityRegistry, RegistryBuildError> {
        let mut entries = BTreeMap::new();

        for capability in self.entries {
            let name = capability.name().to_string();
            if name.trim().is_empty() {
                return Err(RegistryBuildError::InvalidName { name });
            }
            if name == USER_INPUT_CAPABILITY {
                return Err(RegistryBuildError::ReservedName { name });
            }
            if entries.contains_key(&name) {
                return Err(RegistryBuildError::DuplicateName { name });
            }
            entries.insert(name, capability);
        }

        Ok(CapabilityRegistry { entries })
    }
}
