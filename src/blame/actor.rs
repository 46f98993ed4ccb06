use crate::core::{Result, Value};
use std::sync::{Arc, RwLock};

/// Zero-argument callable resolving the current actor. Returns
/// `Value::Null` when nobody is acting.
pub type ActorResolver = Box<dyn Fn() -> Value + Send + Sync>;

/// Resolves "who is currently acting": an explicitly set value wins,
/// otherwise a registered resolver is invoked on every call, otherwise
/// `Null`.
#[derive(Default)]
pub struct ActorProvider {
    actor: RwLock<Option<Value>>,
    resolver: RwLock<Option<ActorResolver>>,
}

impl ActorProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_actor(&self, actor: impl Into<Value>) -> Result<()> {
        *self.actor.write()? = Some(actor.into());
        Ok(())
    }

    /// Drop the explicit actor so the resolver (if any) applies again.
    pub fn reset_actor(&self) -> Result<()> {
        *self.actor.write()? = None;
        Ok(())
    }

    pub fn set_resolver(&self, resolver: ActorResolver) -> Result<()> {
        *self.resolver.write()? = Some(resolver);
        Ok(())
    }

    pub fn actor(&self) -> Result<Value> {
        if let Some(actor) = self.actor.read()?.as_ref() {
            return Ok(actor.clone());
        }
        if let Some(resolver) = self.resolver.read()?.as_ref() {
            return Ok(resolver());
        }
        Ok(Value::Null)
    }
}

/// Minimal security context bridging "the signed-in user" to the actor
/// provider, the way a host application would.
#[derive(Default)]
pub struct SecurityContext {
    user: RwLock<Option<Value>>,
}

impl SecurityContext {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sign_in(&self, user: impl Into<Value>) -> Result<()> {
        *self.user.write()? = Some(user.into());
        Ok(())
    }

    pub fn sign_out(&self) -> Result<()> {
        *self.user.write()? = None;
        Ok(())
    }

    pub fn current(&self) -> Result<Value> {
        Ok(self.user.read()?.clone().unwrap_or(Value::Null))
    }

    /// Resolver handing the signed-in user to an `ActorProvider`.
    pub fn resolver(context: &Arc<Self>) -> ActorResolver {
        let context = Arc::clone(context);
        Box::new(move || context.current().unwrap_or(Value::Null))
    }
}
