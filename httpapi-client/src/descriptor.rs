//! Action descriptors.
//!
//! An [`ActionDescriptor`] is the compiled, immutable form of a
//! [`MethodSignature`]: behaviors and filters sorted by order key, one
//! binding per parameter and a return binding. Descriptors are built once
//! per [`ActionId`] by the [`DescriptorRegistry`] and shared as
//! `Arc<ActionDescriptor>`.
//!
//! ## Parameter binding inference
//!
//! A parameter without an explicit binding gets one from the HTTP method:
//!
//! | Method | Simple parameter | Complex parameter |
//! |--------|------------------|-------------------|
//! | GET, HEAD | path/query | path/query |
//! | anything else | path/query | JSON body |
//!
//! Cancellation parameters are always linked to the call.

mod registry;
mod signature;

use std::sync::Arc;

use http::Method;
use httpapi_core::ApiError;

use crate::behavior::{
    ActionBehavior, CancellationBinding, JsonContent, JsonReturn, ParameterBinding, PathQuery,
    RawReturn, ReturnBinding, XmlReturn,
};
use crate::filter::Filter;

pub use registry::DescriptorRegistry;
pub use signature::{
    MethodSignature, ParamSignature, Passing, ResultShape, ReturnKind, ReturnSignature, TypeKind,
};

/// Identity of an action: owning interface, method name and parameter types.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ActionId {
    pub interface: String,
    pub method: String,
    pub param_types: Vec<String>,
}

impl std::fmt::Display for ActionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{}({})", self.interface, self.method, self.param_types.join(", "))
    }
}

/// A parameter with its binding resolved.
#[derive(Clone)]
pub struct ParameterDescriptor {
    pub index: usize,
    pub name: String,
    pub type_name: String,
    pub kind: TypeKind,
    pub binding: Arc<dyn ParameterBinding>,
}

impl std::fmt::Debug for ParameterDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParameterDescriptor")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct ReturnDescriptor {
    pub type_name: String,
    pub kind: ReturnKind,
    pub binding: Arc<dyn ReturnBinding>,
}

impl std::fmt::Debug for ReturnDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReturnDescriptor")
            .field("type_name", &self.type_name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Compiled metadata for one action.
pub struct ActionDescriptor {
    id: ActionId,
    behaviors: Vec<Arc<dyn ActionBehavior>>,
    filters: Vec<Arc<dyn Filter>>,
    parameters: Vec<ParameterDescriptor>,
    returns: ReturnDescriptor,
}

impl ActionDescriptor {
    /// Compile `signature`, validating its shape.
    ///
    /// Fails with [`ApiError::UnsupportedSignature`] for generic methods,
    /// property accessors, by-reference parameters and blocking returns.
    pub fn build(signature: &MethodSignature) -> Result<Self, ApiError> {
        let id = signature.id();
        let unsupported = |reason: String| ApiError::unsupported_signature(id.to_string(), reason);

        if signature.is_generic {
            return Err(unsupported("generic methods are not supported".into()));
        }
        if signature.is_accessor {
            return Err(unsupported("property accessors are not supported".into()));
        }
        if let Some(param) = signature.params.iter().find(|p| p.passing == Passing::ByRef) {
            return Err(unsupported(format!(
                "parameter `{}` is passed by reference",
                param.name
            )));
        }
        if signature.returns.shape != ResultShape::Future {
            return Err(unsupported(format!(
                "return type `{}` is not an asynchronous result",
                signature.returns.type_name
            )));
        }

        let mut behaviors = signature.behaviors.clone();
        behaviors.sort_by_key(|behavior| behavior.order());
        let mut filters = signature.filters.clone();
        filters.sort_by_key(|filter| filter.order());

        let method = behaviors.iter().find_map(|behavior| behavior.http_method());
        let query_only = matches!(method, Some(ref m) if *m == Method::GET || *m == Method::HEAD);

        let mut parameters = Vec::with_capacity(signature.params.len());
        for (index, param) in signature.params.iter().enumerate() {
            let binding: Arc<dyn ParameterBinding> = match (&param.binding, param.kind) {
                (Some(binding), _) => binding.clone(),
                (None, TypeKind::Cancellation) => Arc::new(CancellationBinding),
                (None, TypeKind::Simple(_)) => Arc::new(PathQuery::new()),
                (None, TypeKind::Complex) if query_only => Arc::new(PathQuery::new()),
                (None, TypeKind::Complex) => Arc::new(JsonContent::new()),
            };
            let descriptor = ParameterDescriptor {
                index,
                name: param.name.clone(),
                type_name: param.type_name.clone(),
                kind: param.kind,
                binding,
            };
            descriptor.binding.validate(&descriptor).map_err(unsupported)?;
            parameters.push(descriptor);
        }

        let binding: Arc<dyn ReturnBinding> = match &signature.return_binding {
            Some(binding) => binding.clone(),
            None => match signature.returns.kind {
                ReturnKind::Json => Arc::new(JsonReturn::new()),
                ReturnKind::Xml => Arc::new(XmlReturn::new()),
                ReturnKind::Text | ReturnKind::Bytes | ReturnKind::Raw | ReturnKind::Unit => {
                    Arc::new(RawReturn::new())
                }
            },
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(
            action = %id,
            behaviors = behaviors.len(),
            filters = filters.len(),
            "built action descriptor"
        );

        Ok(Self {
            id,
            behaviors,
            filters,
            parameters,
            returns: ReturnDescriptor {
                type_name: signature.returns.type_name.clone(),
                kind: signature.returns.kind,
                binding,
            },
        })
    }

    pub fn id(&self) -> &ActionId {
        &self.id
    }

    /// `Interface::method`, for logs and errors.
    pub fn name(&self) -> String {
        format!("{}::{}", self.id.interface, self.id.method)
    }

    /// Action behaviors, ascending by order key.
    pub fn behaviors(&self) -> &[Arc<dyn ActionBehavior>] {
        &self.behaviors
    }

    /// Action filters, ascending by order key.
    pub fn filters(&self) -> &[Arc<dyn Filter>] {
        &self.filters
    }

    pub fn parameters(&self) -> &[ParameterDescriptor] {
        &self.parameters
    }

    pub fn returns(&self) -> &ReturnDescriptor {
        &self.returns
    }

    /// The HTTP method declared by the first behavior that declares one.
    pub fn http_method(&self) -> Option<Method> {
        self.behaviors.iter().find_map(|behavior| behavior.http_method())
    }
}

impl std::fmt::Debug for ActionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionDescriptor")
            .field("id", &self.id)
            .field("behaviors", &self.behaviors.len())
            .field("filters", &self.filters.len())
            .field("parameters", &self.parameters)
            .field("returns", &self.returns)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::{Header, HttpHost, HttpMethod, StaticHeader, Uri};
    use httpapi_core::SimpleKind;

    struct User;

    fn binding_of(descriptor: &ActionDescriptor, index: usize) -> &'static str {
        descriptor.parameters()[index].binding.name()
    }

    #[test]
    fn test_by_ref_parameter_is_unsupported() {
        let signature = MethodSignature::new("IUserApi", "get")
            .behavior(HttpMethod::get("users/{id}"))
            .param(ParamSignature::of::<u64>("id").by_ref());
        let err = ActionDescriptor::build(&signature).unwrap_err();
        assert!(err.is_unsupported_signature());
        assert!(err.to_string().contains("parameter `id` is passed by reference"));
    }

    #[test]
    fn test_other_unsupported_shapes() {
        let base = MethodSignature::new("IUserApi", "get").behavior(HttpMethod::get("users"));

        for signature in [
            base.clone().generic(),
            base.clone().accessor(),
            base.clone().returns(ReturnSignature::json::<User>().blocking()),
        ] {
            assert!(ActionDescriptor::build(&signature).unwrap_err().is_unsupported_signature());
        }
    }

    #[test]
    fn test_get_binds_everything_to_path_query() {
        let signature = MethodSignature::new("IUserApi", "search")
            .behavior(HttpMethod::get("users"))
            .param(ParamSignature::of::<String>("name"))
            .param(ParamSignature::complex::<User>("filter"))
            .param(ParamSignature::cancellation("token"));
        let descriptor = ActionDescriptor::build(&signature).unwrap();

        assert_eq!(descriptor.http_method(), Some(Method::GET));
        assert_eq!(binding_of(&descriptor, 0), "path_query");
        assert_eq!(binding_of(&descriptor, 1), "path_query");
        assert_eq!(binding_of(&descriptor, 2), "cancellation");
        assert_eq!(
            descriptor.parameters()[0].kind,
            TypeKind::Simple(SimpleKind::Text)
        );
    }

    #[test]
    fn test_post_binds_complex_to_json_body() {
        let signature = MethodSignature::new("IUserApi", "create")
            .behavior(HttpMethod::post("users"))
            .param(ParamSignature::of::<Option<i32>>("version"))
            .param(ParamSignature::complex::<User>("user"))
            .param(ParamSignature::of::<String>("trace").bind(Header::new("X-Trace")));
        let descriptor = ActionDescriptor::build(&signature).unwrap();

        assert_eq!(binding_of(&descriptor, 0), "path_query");
        assert_eq!(binding_of(&descriptor, 1), "json_content");
        assert_eq!(binding_of(&descriptor, 2), "header");
    }

    #[test]
    fn test_behaviors_sorted_by_order_then_declaration() {
        let signature = MethodSignature::new("IUserApi", "get")
            .behavior(StaticHeader::new("X-A", "1"))
            .behavior(HttpMethod::get("users"))
            .behavior(StaticHeader::new("X-B", "2"))
            .behavior(HttpHost::new("http://localhost/").unwrap());
        let descriptor = ActionDescriptor::build(&signature).unwrap();

        let orders: Vec<i32> = descriptor.behaviors().iter().map(|b| b.order()).collect();
        assert_eq!(orders, [i32::MIN, i32::MIN + 1, 0, 0]);
    }

    #[test]
    fn test_uri_binding_must_be_first() {
        let signature = MethodSignature::new("IUserApi", "get")
            .behavior(HttpMethod::get(""))
            .param(ParamSignature::of::<String>("name"))
            .param(ParamSignature::of::<String>("uri").bind(Uri::new()));
        assert!(ActionDescriptor::build(&signature).unwrap_err().is_unsupported_signature());
    }

    #[test]
    fn test_return_binding_follows_kind() {
        let descriptor = ActionDescriptor::build(
            &MethodSignature::new("IUserApi", "get").returns(ReturnSignature::json::<User>()),
        )
        .unwrap();
        assert_eq!(descriptor.returns().kind, ReturnKind::Json);
        assert_eq!(descriptor.returns().binding.name(), "json_return");
    }
}
