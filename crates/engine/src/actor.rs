//! Actor resolution: who made the change being versioned.

use std::future::Future;

tokio::task_local! {
    static CURRENT_ACTOR: Option<String>;
}

/// Source of the current actor id, consulted once per committed snapshot.
///
/// Returning `None` is not an error; the snapshot records no actor.
pub trait ActorResolver: Send + Sync {
    fn current_actor_id(&self) -> Option<String>;
}

/// Never resolves an actor.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoActor;

impl ActorResolver for NoActor {
    fn current_actor_id(&self) -> Option<String> {
        None
    }
}

/// Always resolves the same actor (batch jobs, CLI tools).
#[derive(Debug, Clone)]
pub struct FixedActor(pub String);

impl FixedActor {
    pub fn new(actor_id: impl Into<String>) -> Self {
        Self(actor_id.into())
    }
}

impl ActorResolver for FixedActor {
    fn current_actor_id(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// Resolves the actor set for the current task with [`ScopedActor::scope`].
///
/// Outside a scope no actor is resolved.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScopedActor;

impl ScopedActor {
    /// Run `fut` with `actor_id` as the current actor.
    pub async fn scope<F: Future>(actor_id: Option<String>, fut: F) -> F::Output {
        CURRENT_ACTOR.scope(actor_id, fut).await
    }
}

impl ActorResolver for ScopedActor {
    fn current_actor_id(&self) -> Option<String> {
        CURRENT_ACTOR.try_with(Clone::clone).ok().flatten()
    }
}

impl<F> ActorResolver for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn current_actor_id(&self) -> Option<String> {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_actor_resolves() {
        assert_eq!(
            FixedActor::new("alice").current_actor_id(),
            Some("alice".to_string())
        );
        assert_eq!(NoActor.current_actor_id(), None);
    }

    #[test]
    fn closures_are_resolvers() {
        let resolver = || Some("bot".to_string());
        assert_eq!(resolver.current_actor_id(), Some("bot".to_string()));
    }

    #[tokio::test]
    async fn scoped_actor_is_task_local() {
        assert_eq!(ScopedActor.current_actor_id(), None);
        let inside = ScopedActor::scope(Some("carol".to_string()), async {
            ScopedActor.current_actor_id()
        })
        .await;
        assert_eq!(inside, Some("carol".to_string()));
        assert_eq!(ScopedActor.current_actor_id(), None);
    }
}
