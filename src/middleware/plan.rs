//! Interceptor declarations and the per-action plans derived from them.

use std::sync::Arc;

use dashmap::DashMap;

use super::{Around, Before};
use crate::controller::Controller;
use crate::router::HandlerRef;

enum Applies {
    All,
    Only(Vec<String>),
    Except(Vec<String>),
}

impl Applies {
    fn only(actions: &[&str]) -> Self {
        Self::Only(actions.iter().map(|a| (*a).to_owned()).collect())
    }

    fn except(actions: &[&str]) -> Self {
        Self::Except(actions.iter().map(|a| (*a).to_owned()).collect())
    }

    fn covers(&self, action: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(list) => list.iter().any(|a| a == action),
            Self::Except(list) => !list.iter().any(|a| a == action),
        }
    }
}

/// A controller's interceptor declarations, in registration order.
///
/// ```rust
/// use trellis::middleware::{before_fn, Filters};
///
/// let filters = Filters::new()
///     .before(before_fn(|_ex| Ok(())))
///     .before_only(&["destroy"], before_fn(|_ex| Ok(())));
/// assert_eq!(filters.plan_for("show").before_len(), 1);
/// assert_eq!(filters.plan_for("destroy").before_len(), 2);
/// ```
#[derive(Default)]
pub struct Filters {
    before: Vec<(Arc<dyn Before>, Applies)>,
    around: Vec<(Arc<dyn Around>, Applies)>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn before(mut self, filter: impl Before) -> Self {
        let filter: Arc<dyn Before> = Arc::new(filter);
        self.before.push((filter, Applies::All));
        self
    }

    pub fn before_only(mut self, actions: &[&str], filter: impl Before) -> Self {
        let filter: Arc<dyn Before> = Arc::new(filter);
        self.before.push((filter, Applies::only(actions)));
        self
    }

    pub fn before_except(mut self, actions: &[&str], filter: impl Before) -> Self {
        let filter: Arc<dyn Before> = Arc::new(filter);
        self.before.push((filter, Applies::except(actions)));
        self
    }

    pub fn around(mut self, filter: impl Around) -> Self {
        let filter: Arc<dyn Around> = Arc::new(filter);
        self.around.push((filter, Applies::All));
        self
    }

    pub fn around_only(mut self, actions: &[&str], filter: impl Around) -> Self {
        let filter: Arc<dyn Around> = Arc::new(filter);
        self.around.push((filter, Applies::only(actions)));
        self
    }

    pub fn around_except(mut self, actions: &[&str], filter: impl Around) -> Self {
        let filter: Arc<dyn Around> = Arc::new(filter);
        self.around.push((filter, Applies::except(actions)));
        self
    }

    /// The interceptors that apply to `action`, in declaration order.
    pub fn plan_for(&self, action: &str) -> FilterPlan {
        FilterPlan {
            before: self.before.iter()
                .filter(|(_, applies)| applies.covers(action))
                .map(|(f, _)| Arc::clone(f))
                .collect(),
            around: self.around.iter()
                .filter(|(_, applies)| applies.covers(action))
                .map(|(f, _)| Arc::clone(f))
                .collect(),
        }
    }
}

/// The ordered before- and around-interceptors for one action.
#[derive(Clone, Default)]
pub struct FilterPlan {
    pub(crate) before: Vec<Arc<dyn Before>>,
    pub(crate) around: Vec<Arc<dyn Around>>,
}

impl FilterPlan {
    pub fn before_len(&self) -> usize {
        self.before.len()
    }

    pub fn around_len(&self) -> usize {
        self.around.len()
    }

    pub fn is_empty(&self) -> bool {
        self.before.is_empty() && self.around.is_empty()
    }
}

/// Process-wide memo of filter plans keyed by handler.
///
/// Several requests may race to fill the same key. Each computes the plan
/// outside any lock and the last insert wins; plans for the same key are
/// interchangeable, so the race is harmless.
#[derive(Default)]
pub struct FilterCache {
    plans: DashMap<HandlerRef, Arc<FilterPlan>>,
}

impl FilterCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached plan for `handler`, computing it from `controller`
    /// on first use.
    pub fn plan_for(&self, handler: &HandlerRef, controller: &dyn Controller) -> Arc<FilterPlan> {
        if let Some(plan) = self.plans.get(handler) {
            return Arc::clone(plan.value());
        }
        let plan = Arc::new(controller.filters().plan_for(handler.action()));
        self.plans.insert(handler.clone(), Arc::clone(&plan));
        plan
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::ActionResult;
    use crate::exchange::Exchange;
    use crate::middleware::{around_fn, before_fn};

    #[test]
    fn only_and_except_scope_filters() {
        let filters = Filters::new()
            .before_except(&["index"], before_fn(|_| Ok(())))
            .around_only(&["index", "show"], around_fn(|ex, next| next.run(ex)));

        let index = filters.plan_for("index");
        assert_eq!((index.before_len(), index.around_len()), (0, 1));
        let show = filters.plan_for("show");
        assert_eq!((show.before_len(), show.around_len()), (1, 1));
        let destroy = filters.plan_for("destroy");
        assert_eq!((destroy.before_len(), destroy.around_len()), (1, 0));
        assert!(Filters::new().plan_for("x").is_empty());
    }

    struct Counting(Arc<AtomicUsize>);

    impl Controller for Counting {
        fn call(&mut self, _action: &str, _ex: &mut Exchange) -> ActionResult {
            Ok(())
        }

        fn filters(&self) -> Filters {
            self.0.fetch_add(1, Ordering::SeqCst);
            Filters::new().before(before_fn(|_| Ok(())))
        }
    }

    #[test]
    fn cache_computes_each_key_once() {
        let computed = Arc::new(AtomicUsize::new(0));
        let controller = Counting(Arc::clone(&computed));
        let cache = FilterCache::new();
        let show = HandlerRef::new("counting", "show");

        let first = cache.plan_for(&show, &controller);
        let second = cache.plan_for(&show, &controller);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(computed.load(Ordering::SeqCst), 1);

        cache.plan_for(&HandlerRef::new("counting", "index"), &controller);
        assert_eq!(computed.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
    }
}
