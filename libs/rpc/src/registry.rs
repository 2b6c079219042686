//! Service and method registry.
//!
//! A service is described once, independent of any server, as a
//! `ServiceDescriptor<S, C>`: `S` is the service's interface (usually a
//! `dyn Trait`) and `C` the codec type the server falls back to. Each method
//! pairs a typed handler with an optional decode override. Registering an
//! instance binds every handler to that instance, so dispatch only ever calls
//! typed closures and never has to downcast.
//!
//! Registration goes through [`RegistryBuilder`], which takes `&mut self` and
//! is consumed by `build()`. The resulting [`Registry`] is immutable, so the
//! dispatch path reads it from many tasks without any lock.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use mqrpc_core::{MethodName, ServiceName};
use mqrpc_fabric::codec::{Codec, JsonCodec};

use crate::error::{payload_preview, BoxError, Error, Result};

pub(crate) type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Decode function for one method's input type
pub type DecodeFn<I> = Arc<dyn Fn(&[u8]) -> mqrpc_fabric::Result<I> + Send + Sync>;

type Invoke<S, C> =
    Arc<dyn Fn(Arc<S>, CallContext, &C, &[u8]) -> BoxFuture<Result<()>> + Send + Sync>;

type BoundInvoke<C> = Arc<dyn Fn(CallContext, &C, &[u8]) -> BoxFuture<Result<()>> + Send + Sync>;

/// Per-call information handed to every handler
#[derive(Debug, Clone)]
pub struct CallContext {
    service: ServiceName,
    method: MethodName,
    cancellation: CancellationToken,
}

impl CallContext {
    pub fn new(service: ServiceName, method: MethodName, cancellation: CancellationToken) -> Self {
        Self {
            service,
            method,
            cancellation,
        }
    }

    pub fn service(&self) -> &ServiceName {
        &self.service
    }

    pub fn method(&self) -> &MethodName {
        &self.method
    }

    /// Fires when the server is asked to stop
    ///
    /// The server never interrupts a running handler; long-running handlers
    /// may watch this token to finish early.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }
}

/// One named method: a typed handler plus an optional decode override
pub struct MethodDescriptor<S: ?Sized, C = JsonCodec> {
    name: MethodName,
    overrides_decode: bool,
    invoke: Invoke<S, C>,
}

impl<S, C> MethodDescriptor<S, C>
where
    S: ?Sized + Send + Sync + 'static,
    C: Codec + 'static,
{
    /// Method whose payload is decoded with the server's default codec
    pub fn new<I, O, E, F, Fut>(name: impl Into<MethodName>, handler: F) -> Self
    where
        I: DeserializeOwned + Send + 'static,
        O: Send + 'static,
        E: Into<BoxError> + Send + 'static,
        F: Fn(Arc<S>, CallContext, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<O, E>> + Send + 'static,
    {
        Self::build(name.into(), None, handler)
    }

    /// Method whose payload is always decoded with `decoder`
    pub fn with_decoder<D, I, O, E, F, Fut>(
        name: impl Into<MethodName>,
        decoder: D,
        handler: F,
    ) -> Self
    where
        D: Codec + 'static,
        I: DeserializeOwned + Send + 'static,
        O: Send + 'static,
        E: Into<BoxError> + Send + 'static,
        F: Fn(Arc<S>, CallContext, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<O, E>> + Send + 'static,
    {
        let decode: DecodeFn<I> = Arc::new(move |bytes: &[u8]| decoder.decode::<I>(bytes));
        Self::build(name.into(), Some(decode), handler)
    }

    /// Method whose payload is decoded by an arbitrary function
    pub fn with_decode_fn<I, O, E, F, Fut>(
        name: impl Into<MethodName>,
        decode: DecodeFn<I>,
        handler: F,
    ) -> Self
    where
        I: DeserializeOwned + Send + 'static,
        O: Send + 'static,
        E: Into<BoxError> + Send + 'static,
        F: Fn(Arc<S>, CallContext, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<O, E>> + Send + 'static,
    {
        Self::build(name.into(), Some(decode), handler)
    }

    pub fn name(&self) -> &MethodName {
        &self.name
    }

    pub fn overrides_decode(&self) -> bool {
        self.overrides_decode
    }

    fn build<I, O, E, F, Fut>(name: MethodName, decode: Option<DecodeFn<I>>, handler: F) -> Self
    where
        I: DeserializeOwned + Send + 'static,
        O: Send + 'static,
        E: Into<BoxError> + Send + 'static,
        F: Fn(Arc<S>, CallContext, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<O, E>> + Send + 'static,
    {
        let overrides_decode = decode.is_some();
        let handler = Arc::new(handler);

        let invoke = erase(
            move |service: Arc<S>, ctx: CallContext, default: &C, payload: &[u8]| {
                // Decode before building the future so the payload borrow ends here.
                let decoded = decode_input(decode.as_ref(), default, payload).map_err(|source| {
                    Error::Decode {
                        service: ctx.service().clone(),
                        method: ctx.method().clone(),
                        payload: payload_preview(payload),
                        source,
                    }
                });
                let handler = Arc::clone(&handler);

                let call: BoxFuture<Result<()>> = Box::pin(async move {
                    let input = decoded?;
                    let (service_name, method_name) = (ctx.service().clone(), ctx.method().clone());
                    // Output is dropped: delivery is fire-and-forget.
                    match (*handler)(service, ctx, input).await {
                        Ok(_) => Ok(()),
                        Err(error) => Err(Error::Handler {
                            service: service_name,
                            method: method_name,
                            source: error.into(),
                        }),
                    }
                });
                call
            },
        );

        Self {
            name,
            overrides_decode,
            invoke,
        }
    }
}

fn erase<S, C, F>(invoke: F) -> Invoke<S, C>
where
    S: ?Sized,
    F: Fn(Arc<S>, CallContext, &C, &[u8]) -> BoxFuture<Result<()>> + Send + Sync + 'static,
{
    Arc::new(invoke)
}

fn bind<C, F>(invoke: F) -> BoundInvoke<C>
where
    F: Fn(CallContext, &C, &[u8]) -> BoxFuture<Result<()>> + Send + Sync + 'static,
{
    Arc::new(invoke)
}

/// Two-level codec resolution: the method's override, else the default
fn decode_input<I, C>(
    override_decode: Option<&DecodeFn<I>>,
    default: &C,
    payload: &[u8],
) -> mqrpc_fabric::Result<I>
where
    I: DeserializeOwned,
    C: Codec,
{
    match override_decode {
        Some(decode) => decode(payload),
        None => default.decode(payload),
    }
}

/// A named group of methods served by one instance of `S`
pub struct ServiceDescriptor<S: ?Sized, C = JsonCodec> {
    name: ServiceName,
    methods: HashMap<MethodName, MethodDescriptor<S, C>>,
}

impl<S, C> ServiceDescriptor<S, C>
where
    S: ?Sized + Send + Sync + 'static,
    C: Codec + 'static,
{
    pub fn new(name: impl Into<ServiceName>) -> Self {
        Self {
            name: name.into(),
            methods: HashMap::new(),
        }
    }

    /// Add a method; a method with the same name is replaced
    pub fn method(mut self, method: MethodDescriptor<S, C>) -> Self {
        self.methods.insert(method.name.clone(), method);
        self
    }

    pub fn name(&self) -> &ServiceName {
        &self.name
    }

    pub fn method_names(&self) -> impl Iterator<Item = &MethodName> {
        self.methods.keys()
    }
}

/// A method bound to its service instance
pub(crate) struct BoundMethod<C> {
    invoke: BoundInvoke<C>,
}

impl<C> BoundMethod<C> {
    /// Decode the payload and start the handler
    pub(crate) fn invoke(
        &self,
        ctx: CallContext,
        default: &C,
        payload: &[u8],
    ) -> BoxFuture<Result<()>> {
        (self.invoke)(ctx, default, payload)
    }
}

/// Immutable routing table built by [`RegistryBuilder`]
pub struct Registry<C = JsonCodec> {
    services: HashMap<ServiceName, HashMap<MethodName, BoundMethod<C>>>,
}

impl<C> Registry<C> {
    /// Find the method for a routing key
    pub(crate) fn resolve(
        &self,
        service: &ServiceName,
        method: &MethodName,
    ) -> Result<&BoundMethod<C>> {
        let methods = self
            .services
            .get(service)
            .ok_or_else(|| Error::NoSuchService(service.clone()))?;

        methods.get(method).ok_or_else(|| Error::NoSuchMethod {
            service: service.clone(),
            method: method.clone(),
        })
    }

    pub fn contains(&self, service: &str, method: &str) -> bool {
        self.services
            .get(service)
            .is_some_and(|methods| methods.contains_key(method))
    }

    pub fn service_names(&self) -> impl Iterator<Item = &ServiceName> {
        self.services.keys()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

/// Mutable registration phase of a [`Registry`]
pub struct RegistryBuilder<C = JsonCodec> {
    services: HashMap<ServiceName, HashMap<MethodName, BoundMethod<C>>>,
}

impl<C: Codec + 'static> RegistryBuilder<C> {
    pub fn new() -> Self {
        Self {
            services: HashMap::new(),
        }
    }

    /// Register `instance` under the descriptor's own name
    pub fn register<S>(&mut self, instance: Arc<S>, descriptor: ServiceDescriptor<S, C>)
    where
        S: ?Sized + Send + Sync + 'static,
    {
        let name = descriptor.name.clone();
        self.register_as(instance, name, descriptor);
    }

    /// Register `instance` under `name`, replacing any service already there
    ///
    /// Handlers are not checked against anything here; a method that cannot
    /// decode its payloads fails on first dispatch.
    pub fn register_as<S>(
        &mut self,
        instance: Arc<S>,
        name: impl Into<ServiceName>,
        descriptor: ServiceDescriptor<S, C>,
    ) where
        S: ?Sized + Send + Sync + 'static,
    {
        let name = name.into();
        let methods = descriptor
            .methods
            .into_iter()
            .map(|(method_name, method)| {
                let instance = Arc::clone(&instance);
                let invoke = method.invoke;
                let bound = bind(move |ctx: CallContext, default: &C, payload: &[u8]| {
                    invoke(Arc::clone(&instance), ctx, default, payload)
                });
                (method_name, BoundMethod { invoke: bound })
            })
            .collect::<HashMap<_, _>>();

        tracing::debug!(service = %name, methods = methods.len(), "registered service");
        if self.services.insert(name.clone(), methods).is_some() {
            tracing::warn!(service = %name, "service registered twice, previous registration replaced");
        }
    }

    pub fn build(self) -> Registry<C> {
        Registry {
            services: self.services,
        }
    }
}

impl<C: Codec + 'static> Default for RegistryBuilder<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mqrpc_fabric::codec::MessagePackCodec;

    struct Counter;

    fn noop(name: &str) -> MethodDescriptor<Counter> {
        MethodDescriptor::new(name, |_svc: Arc<Counter>, _ctx: CallContext, _input: u32| async {
            Ok::<_, BoxError>(())
        })
    }

    #[test]
    fn same_method_name_replaces_previous_descriptor() {
        let descriptor = ServiceDescriptor::new("Counter")
            .method(noop("Counter/Add"))
            .method(MethodDescriptor::with_decoder(
                "Counter/Add",
                MessagePackCodec,
                |_svc: Arc<Counter>, _ctx: CallContext, _input: u32| async { Ok::<_, BoxError>(()) },
            ));

        assert_eq!(descriptor.method_names().count(), 1);
        assert!(descriptor.methods["Counter/Add"].overrides_decode());
    }

    #[test]
    fn built_registry_resolves_routing_keys() {
        let mut builder = RegistryBuilder::<JsonCodec>::new();
        builder.register(
            Arc::new(Counter),
            ServiceDescriptor::new("Counter").method(noop("Counter/Add")),
        );
        let registry = builder.build();

        assert!(registry.contains("Counter", "Counter/Add"));
        assert!(!registry.contains("Counter", "Counter/Sub"));
        assert!(matches!(
            registry.resolve(&"Other".into(), &"Counter/Add".into()),
            Err(Error::NoSuchService(_))
        ));
        assert!(matches!(
            registry.resolve(&"Counter".into(), &"Counter/Sub".into()),
            Err(Error::NoSuchMethod { .. })
        ));
    }

    #[tokio::test]
    async fn decode_override_wins_over_default() {
        let mut builder = RegistryBuilder::<JsonCodec>::new();
        builder.register(
            Arc::new(Counter),
            ServiceDescriptor::new("Counter").method(MethodDescriptor::with_decoder(
                "Counter/Add",
                MessagePackCodec,
                |_svc: Arc<Counter>, _ctx: CallContext, input: u32| async move {
                    if input == 7 {
                        Ok(())
                    } else {
                        Err(BoxError::from("wrong input"))
                    }
                },
            )),
        );
        let registry = builder.build();
        let (service, method) = (ServiceName::from("Counter"), MethodName::from("Counter/Add"));
        let ctx = CallContext::new(service.clone(), method.clone(), CancellationToken::new());
        let payload = MessagePackCodec.encode(&7u32).unwrap();

        let bound = registry.resolve(&service, &method).unwrap();
        bound.invoke(ctx, &JsonCodec, &payload).await.unwrap();
    }
}
