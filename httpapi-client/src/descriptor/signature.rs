//! Explicit method signatures.
//!
//! A [`MethodSignature`] is what a dispatcher (hand-written or generated)
//! registers for each interface method. It carries everything the
//! descriptor builder needs: identity, parameter shapes, the return shape
//! and the declared behaviors and filters.

use std::sync::Arc;

use httpapi_core::{SimpleKind, ToValue};

use crate::behavior::{ActionBehavior, ParameterBinding, ReturnBinding};
use crate::filter::Filter;

use super::ActionId;

/// How a parameter's type is classified for binding inference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Simple(SimpleKind),
    /// Objects, collections and anything else not in the simple set.
    Complex,
    /// A cancellation token, linked to the call rather than the request.
    Cancellation,
}

/// How a parameter is passed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Passing {
    #[default]
    ByValue,
    /// By reference (`ref`/`out`/`&mut` style). Not supported.
    ByRef,
}

/// Whether the method returns a future or blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ResultShape {
    #[default]
    Future,
    /// A synchronous return. Not supported.
    Blocking,
}

/// What the caller expects back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReturnKind {
    Json,
    Xml,
    Text,
    Bytes,
    /// The raw response.
    Raw,
    Unit,
}

#[derive(Clone)]
pub struct ParamSignature {
    pub name: String,
    pub type_name: String,
    pub kind: TypeKind,
    pub passing: Passing,
    pub binding: Option<Arc<dyn ParameterBinding>>,
}

impl ParamSignature {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            kind,
            passing: Passing::ByValue,
            binding: None,
        }
    }

    /// A parameter of type `T`, classified by [`ToValue::simple_kind`].
    ///
    /// `Option<T>` is classified as `T`.
    pub fn of<T: ToValue + ?Sized>(name: impl Into<String>) -> Self {
        let kind = T::simple_kind().map_or(TypeKind::Complex, TypeKind::Simple);
        Self::new(name, std::any::type_name::<T>(), kind)
    }

    /// A complex parameter (model object) of type `T`.
    pub fn complex<T: ?Sized>(name: impl Into<String>) -> Self {
        Self::new(name, std::any::type_name::<T>(), TypeKind::Complex)
    }

    /// A cancellation token parameter.
    pub fn cancellation(name: impl Into<String>) -> Self {
        Self::new(name, "CancellationToken", TypeKind::Cancellation)
    }

    pub fn by_ref(mut self) -> Self {
        self.passing = Passing::ByRef;
        self
    }

    /// Bind the parameter explicitly instead of inferring a binding.
    pub fn bind(mut self, binding: impl ParameterBinding) -> Self {
        self.binding = Some(Arc::new(binding));
        self
    }
}

impl std::fmt::Debug for ParamSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParamSignature")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .field("kind", &self.kind)
            .field("passing", &self.passing)
            .field("binding", &self.binding.is_some())
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReturnSignature {
    pub type_name: String,
    pub shape: ResultShape,
    pub kind: ReturnKind,
}

impl ReturnSignature {
    pub fn new(type_name: impl Into<String>, kind: ReturnKind) -> Self {
        Self {
            type_name: type_name.into(),
            shape: ResultShape::Future,
            kind,
        }
    }

    /// A JSON body deserialized into `T`.
    pub fn json<T: ?Sized>() -> Self {
        Self::new(std::any::type_name::<T>(), ReturnKind::Json)
    }

    /// An XML body deserialized into `T`.
    pub fn xml<T: ?Sized>() -> Self {
        Self::new(std::any::type_name::<T>(), ReturnKind::Xml)
    }

    pub fn text() -> Self {
        Self::new("String", ReturnKind::Text)
    }

    pub fn bytes() -> Self {
        Self::new("Bytes", ReturnKind::Bytes)
    }

    pub fn raw() -> Self {
        Self::new("HttpResponse", ReturnKind::Raw)
    }

    pub fn unit() -> Self {
        Self::new("()", ReturnKind::Unit)
    }

    pub fn blocking(mut self) -> Self {
        self.shape = ResultShape::Blocking;
        self
    }
}

impl Default for ReturnSignature {
    fn default() -> Self {
        Self::unit()
    }
}

/// The registered shape of one interface method.
///
/// # Example
///
/// ```ignore
/// use httpapi_client::behavior::{HttpMethod, JsonContent};
/// use httpapi_client::descriptor::{MethodSignature, ParamSignature, ReturnSignature};
///
/// let signature = MethodSignature::new("UserApi", "update_user")
///     .behavior(HttpMethod::put("users/{id}"))
///     .param(ParamSignature::of::<u64>("id"))
///     .param(ParamSignature::complex::<User>("user").bind(JsonContent::new()))
///     .returns(ReturnSignature::json::<User>());
/// ```
#[derive(Clone, Default)]
pub struct MethodSignature {
    pub interface: String,
    pub name: String,
    pub is_generic: bool,
    pub is_accessor: bool,
    pub params: Vec<ParamSignature>,
    pub returns: ReturnSignature,
    pub behaviors: Vec<Arc<dyn ActionBehavior>>,
    pub filters: Vec<Arc<dyn Filter>>,
    pub return_binding: Option<Arc<dyn ReturnBinding>>,
}

impl MethodSignature {
    pub fn new(interface: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn generic(mut self) -> Self {
        self.is_generic = true;
        self
    }

    pub fn accessor(mut self) -> Self {
        self.is_accessor = true;
        self
    }

    pub fn param(mut self, param: ParamSignature) -> Self {
        self.params.push(param);
        self
    }

    pub fn returns(mut self, returns: ReturnSignature) -> Self {
        self.returns = returns;
        self
    }

    pub fn behavior(mut self, behavior: impl ActionBehavior) -> Self {
        self.behaviors.push(Arc::new(behavior));
        self
    }

    pub fn filter(mut self, filter: impl Filter) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    /// Decode the response with `binding` instead of the one implied by the
    /// return kind.
    pub fn return_binding(mut self, binding: impl ReturnBinding) -> Self {
        self.return_binding = Some(Arc::new(binding));
        self
    }

    pub fn id(&self) -> ActionId {
        ActionId {
            interface: self.interface.clone(),
            method: self.name.clone(),
            param_types: self.params.iter().map(|p| p.type_name.clone()).collect(),
        }
    }
}

impl std::fmt::Debug for MethodSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodSignature")
            .field("interface", &self.interface)
            .field("name", &self.name)
            .field("params", &self.params)
            .field("returns", &self.returns)
            .field("behaviors", &self.behaviors.len())
            .field("filters", &self.filters.len())
            .finish_non_exhaustive()
    }
}
