//! Link-time type registry.
//!
//! Types opt in with `#[power::grpc_server]` (marked, the discovery switch)
//! or `#[power::loadable]` (known by name, never served). Both submit a
//! [`TypeRegistration`] that [`TypeRegistry::collect`] gathers at runtime.

use std::{
    any::Any,
    collections::HashMap,
    marker::PhantomData,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};

use foldhash::fast::RandomState;

use crate::{BindableService, Error, ErrorKind, Result, TypeReference};

/// A freshly constructed registered type.
pub enum Instance {
    /// The type implements [`BindableService`].
    Service(Arc<dyn BindableService>),
    Plain(Box<dyn Any + Send>),
}

impl Instance {
    #[must_use]
    pub fn into_service(self) -> Option<Arc<dyn BindableService>> {
        match self {
            Instance::Service(service) => Some(service),
            Instance::Plain(_) => None,
        }
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Instance::Service(_) => f.write_str("Instance::Service"),
            Instance::Plain(_) => f.write_str("Instance::Plain"),
        }
    }
}

/// One registered type.
#[derive(Debug, Clone, Copy)]
pub struct TypeRegistration {
    /// `module_path!()` where the type is declared.
    pub module_path: &'static str,
    pub ident: &'static str,
    /// Carries the discovery marker.
    pub marked: bool,
    /// The no-argument construction path.
    pub instantiate: fn() -> Instance,
}

inventory::collect!(TypeRegistration);

impl TypeRegistration {
    /// Dot-separated name with the crate segment dropped:
    /// `power_demo::server` + `HelloServer` is `server.HelloServer`.
    #[must_use]
    pub fn type_reference(&self) -> TypeReference {
        let namespace = self
            .module_path
            .split_once("::")
            .map_or("", |(_, rest)| rest)
            .replace("::", ".");
        TypeReference::new(&namespace, self.ident)
    }

    /// Runs the constructor. A panic inside it is contained and reported.
    ///
    /// # Errors
    ///
    /// Returns `InstantiateFailed` if the constructor panics.
    pub fn instantiate(&self) -> Result<Instance> {
        catch_unwind(AssertUnwindSafe(self.instantiate)).map_err(|panic| {
            let reason = panic
                .downcast_ref::<&str>()
                .map(ToString::to_string)
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Error::new(
                ErrorKind::InstantiateFailed,
                format!("{}: {reason}", self.type_reference()),
            )
        })
    }
}

/// Registered types by fully-qualified name.
#[derive(Debug, Default, Clone)]
pub struct TypeRegistry {
    types: HashMap<TypeReference, TypeRegistration, RandomState>,
}

impl TypeRegistry {
    /// Every registration linked into this binary.
    #[must_use]
    pub fn collect() -> Self {
        Self::from_registrations(inventory::iter::<TypeRegistration>.into_iter().copied())
    }

    pub fn from_registrations(registrations: impl IntoIterator<Item = TypeRegistration>) -> Self {
        let mut registry = Self::default();
        for registration in registrations {
            registry.register(registration);
        }
        registry
    }

    /// Adds `registration`, replacing any earlier one with the same name.
    pub fn register(&mut self, registration: TypeRegistration) {
        let name = registration.type_reference();
        if self.types.insert(name.clone(), registration).is_some() {
            tracing::warn!("type {name} registered twice, keeping the last registration");
        }
    }

    /// # Errors
    ///
    /// Returns `TypeNotFound` if nothing is registered under `name`.
    pub fn resolve(&self, name: &TypeReference) -> Result<&TypeRegistration> {
        self.types
            .get(name)
            .ok_or_else(|| Error::new(ErrorKind::TypeNotFound, name.to_string()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Picks the constructor for `T` at expansion time: types implementing
/// [`BindableService`] become [`Instance::Service`], everything else
/// [`Instance::Plain`]. Call as `(&Probe::<T>::new()).instance()` with both
/// traits in scope.
#[doc(hidden)]
pub struct Probe<T>(PhantomData<fn() -> T>);

impl<T> Probe<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for Probe<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[doc(hidden)]
pub trait ProbeService {
    fn instance(&self) -> Instance;
}

impl<T: BindableService + Default> ProbeService for Probe<T> {
    fn instance(&self) -> Instance {
        Instance::Service(Arc::new(T::default()))
    }
}

#[doc(hidden)]
pub trait ProbePlain {
    fn instance(&self) -> Instance;
}

impl<T: Default + Send + 'static> ProbePlain for &Probe<T> {
    fn instance(&self) -> Instance {
        Instance::Plain(Box::new(T::default()))
    }
}
