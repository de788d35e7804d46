//! Controllers and the collaborator that constructs them.
//!
//! A fresh controller instance is built for every request, so actions are
//! free to keep per-request state in `self`. The dispatcher never builds
//! controllers itself; it asks a [`ControllerFactory`]. [`ControllerRegistry`]
//! is a ready-made factory backed by constructor closures; plug in your own
//! (a DI container, an object pool) by implementing the trait.

use std::collections::HashMap;

use crate::error::{ActionResult, Error};
use crate::exchange::Exchange;
use crate::middleware::Filters;

/// A set of named actions.
///
/// ```rust
/// use trellis::{ActionResult, Controller, Error, Exchange};
///
/// #[derive(Default)]
/// struct Users;
///
/// impl Controller for Users {
///     fn call(&mut self, action: &str, ex: &mut Exchange) -> ActionResult {
///         match action {
///             "show" => {
///                 let id = ex.request().param("id").unwrap_or("0").to_owned();
///                 ex.render(format!("user {id}"))
///             }
///             other => Err(Error::unknown_action("users", other).into()),
///         }
///     }
/// }
/// ```
pub trait Controller: Send {
    /// Runs `action`. Stage output on `ex`; never write to the transport.
    fn call(&mut self, action: &str, ex: &mut Exchange) -> ActionResult;

    /// Runs `action` as the application error handler, with the failure that
    /// aborted the request.
    fn rescue(&mut self, action: &str, error: &Error, ex: &mut Exchange) -> ActionResult {
        let _ = (error, ex);
        Err(Error::action(format!("`{action}` is not an error handler")).into())
    }

    /// Interceptor declarations. Must not depend on instance state: the plan
    /// derived from it is cached per (controller, action) for the process
    /// lifetime.
    fn filters(&self) -> Filters {
        Filters::new()
    }
}

/// Builds controller instances by name.
pub trait ControllerFactory: Send + Sync {
    fn new_instance(&self, controller: &str) -> Result<Box<dyn Controller>, Error>;
}

type Constructor = Box<dyn Fn() -> Box<dyn Controller> + Send + Sync>;

/// A [`ControllerFactory`] backed by constructor closures.
///
/// ```rust
/// # use trellis::{ActionResult, Controller, Exchange};
/// # #[derive(Default)] struct Users;
/// # impl Controller for Users {
/// #     fn call(&mut self, _: &str, _: &mut Exchange) -> ActionResult { Ok(()) }
/// # }
/// use trellis::{ControllerFactory, ControllerRegistry};
///
/// let registry = ControllerRegistry::new().register("users", Users::default);
/// assert!(registry.new_instance("users").is_ok());
/// assert!(registry.new_instance("posts").is_err());
/// ```
#[derive(Default)]
pub struct ControllerRegistry {
    constructors: HashMap<String, Constructor>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a constructor. A later registration under the same name
    /// replaces the earlier one.
    pub fn register<C, F>(mut self, name: &str, constructor: F) -> Self
    where
        C: Controller + 'static,
        F: Fn() -> C + Send + Sync + 'static,
    {
        let erased: Constructor = Box::new(move || -> Box<dyn Controller> { Box::new(constructor()) });
        self.constructors.insert(name.to_owned(), erased);
        self
    }
}

impl ControllerFactory for ControllerRegistry {
    fn new_instance(&self, controller: &str) -> Result<Box<dyn Controller>, Error> {
        self.constructors
            .get(controller)
            .map(|construct| construct())
            .ok_or_else(|| Error::UnknownController(controller.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::method::Method;
    use crate::request::Request;
    use crate::response::Response;
    use crate::sink::ResponseSink;

    struct Echo {
        calls: usize,
    }

    impl Controller for Echo {
        fn call(&mut self, action: &str, ex: &mut Exchange) -> ActionResult {
            self.calls += 1;
            ex.render(format!("{action}:{}", self.calls))
        }
    }

    fn exchange() -> Exchange {
        let sink = ResponseSink::new(|_resp: Response| -> std::io::Result<()> { Ok(()) });
        Exchange::new(Arc::new(Request::new(Method::Get, "/")), sink)
    }

    #[test]
    fn each_instance_is_fresh() {
        let registry = ControllerRegistry::new().register("echo", || Echo { calls: 0 });
        for _ in 0..2 {
            let mut controller = registry.new_instance("echo").unwrap();
            let mut ex = exchange();
            assert!(controller.call("ping", &mut ex).is_err());
            assert_eq!(ex.response().staged().body(), b"ping:1");
        }
    }

    #[test]
    fn unknown_controller() {
        let err = ControllerRegistry::new().new_instance("ghost").err().unwrap();
        assert!(matches!(err, Error::UnknownController(name) if name == "ghost"));
    }

    #[test]
    fn default_rescue_refuses() {
        let mut controller = Echo { calls: 0 };
        let result = controller.rescue("ping", &Error::action("x"), &mut exchange());
        assert!(matches!(result, Err(crate::error::Halt::Failed(Error::Action(_)))));
    }
}
