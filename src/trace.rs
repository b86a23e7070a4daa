//! Call tracing: logs entry, exit and failure of a call together with its
//! arguments and result.
//!
//! ```no_run
//! use mast_logging::{call_args, LoggerDefaults, LoggerRegistry};
//!
//! let registry = LoggerRegistry::new(LoggerDefaults::new("/opt/mast/var/log"));
//! let tracer = registry.tracer("jobs")?;
//!
//! let total = tracer.call("sum", &call_args!(1, 2; scale = 10), || (1 + 2) * 10);
//!
//! let add = tracer.wrap("add", |(a, b): (i32, i32)| a + b);
//! assert_eq!(add.call((2, 3)), 5);
//! # Ok::<(), mast_logging::Error>(())
//! ```

use std::{
    any::Any,
    borrow::Cow,
    convert::Infallible,
    fmt::{self, Debug, Display},
    panic::{self, AssertUnwindSafe, Location},
    sync::Arc,
};

use log::Level;

use crate::{
    error::Result,
    logging::{Logger, LoggerRegistry},
};

pub const DEFAULT_TRACER_NAME: &str = "default";

/// Strips CR/LF and entity-encodes quotes so a value stays inside one quoted field.
pub fn escape(text: &str) -> String {
    text.replace(['\n', '\r'], "")
        .replace('\'', "&apos;")
        .replace('"', "&quot;")
}

/// `'a', 'b'`
pub fn format_positional(positional: &[String]) -> String {
    positional
        .iter()
        .map(|arg| format!("'{}'", arg))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `key=value, other=value`
pub fn format_keywords(keyword: &[(String, String)]) -> String {
    keyword
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn format_arguments(positional: &[String], keyword: &[(String, String)]) -> String {
    let mut arguments = format_positional(positional);

    if !keyword.is_empty() {
        if !positional.is_empty() {
            arguments.push_str(", ");
        }
        arguments.push_str(&format_keywords(keyword));
    }

    arguments
}

/// Arguments of a traced call, already rendered to text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallArgs {
    positional: Vec<String>,
    keyword: Vec<(String, String)>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, value: impl Display) -> Self {
        self.positional.push(value.to_string());
        self
    }

    pub fn kwarg(mut self, key: impl Into<String>, value: impl Display) -> Self {
        self.keyword.push((key.into(), value.to_string()));
        self
    }
}

impl Display for CallArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_arguments(&self.positional, &self.keyword))
    }
}

/// Builds [`CallArgs`]: positional values, then `;` and `key = value` pairs.
///
/// ```
/// use mast_logging::call_args;
///
/// assert_eq!(call_args!(1, "x"; k = "v").to_string(), "'1', 'x', k=v");
/// ```
#[macro_export]
macro_rules! call_args {
    ($($arg:expr),* $(; $($key:ident = $value:expr),* )?) => {{
        #[allow(unused_mut)]
        let mut args = $crate::trace::CallArgs::new();
        $( args = args.arg(&$arg); )*
        $( $( args = args.kwarg(stringify!($key), &$value); )* )?
        args
    }};
}

/// Positional arguments of a wrapped function.
pub trait IntoCallArgs {
    fn to_call_args(&self) -> CallArgs;
}

impl IntoCallArgs for () {
    fn to_call_args(&self) -> CallArgs {
        CallArgs::new()
    }
}

macro_rules! tuple_call_args {
    ($($ty:ident $var:ident),+) => {
        impl<$($ty: Display),+> IntoCallArgs for ($($ty,)+) {
            fn to_call_args(&self) -> CallArgs {
                let ($($var,)+) = self;
                CallArgs::new()$(.arg($var))+
            }
        }
    };
}

tuple_call_args!(A a);
tuple_call_args!(A a, B b);
tuple_call_args!(A a, B b, C c);
tuple_call_args!(A a, B b, C c, D d);
tuple_call_args!(A a, B b, C c, D d, E e);
tuple_call_args!(A a, B b, C c, D d, E e, F f);

/// Logs calls to the sink named at construction.
#[derive(Clone)]
pub struct Tracer {
    logger: Arc<Logger>,
}

impl Tracer {
    pub fn new(registry: &LoggerRegistry, name: &str) -> Result<Self> {
        Ok(Self {
            logger: registry.logger(name)?,
        })
    }

    pub fn logger(&self) -> &Arc<Logger> {
        &self.logger
    }

    /// Runs `f` between an entry and an exit record. A panic is logged as an
    /// error and resumed with its original payload.
    #[track_caller]
    pub fn call<R, F>(&self, function: &str, args: &CallArgs, f: F) -> R
    where
        F: FnOnce() -> R,
        R: Debug,
    {
        let location = Location::caller();
        match self.run(function, args, location, || Ok::<R, Infallible>(f())) {
            Ok(result) => result,
            Err(never) => match never {},
        }
    }

    /// Like [`Tracer::call`], and an `Err` is logged as a failure too.
    /// The result is returned as is either way.
    #[track_caller]
    pub fn try_call<T, E, F>(&self, function: &str, args: &CallArgs, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce() -> std::result::Result<T, E>,
        T: Debug,
        E: Debug,
    {
        self.run(function, args, Location::caller(), f)
    }

    pub fn wrap<F>(&self, function: impl Into<Cow<'static, str>>, f: F) -> Traced<F> {
        Traced {
            tracer: self.clone(),
            function: function.into(),
            f,
        }
    }

    fn run<T, E, F>(
        &self,
        function: &str,
        args: &CallArgs,
        location: &'static Location<'static>,
        f: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce() -> std::result::Result<T, E>,
        T: Debug,
        E: Debug,
    {
        let call = format!("{}({})", function, args);

        self.logger.log_at(
            Level::Info,
            format_args!("Attempting to execute {}", call),
            None,
            location,
        );

        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(Ok(result)) => {
                self.logger.log_at(
                    Level::Info,
                    format_args!(
                        "Finished execution of {}. Result: {}",
                        call,
                        escape(&format!("{:?}", result))
                    ),
                    None,
                    location,
                );
                Ok(result)
            }
            Ok(Err(err)) => {
                self.failed(&call, &format!("{:?}", err), location);
                Err(err)
            }
            Err(payload) => {
                self.failed(&call, &panic_message(payload.as_ref()), location);
                panic::resume_unwind(payload)
            }
        }
    }

    fn failed(&self, call: &str, context: &str, location: &'static Location<'static>) {
        self.logger.log_at(
            Level::Error,
            format_args!(
                "An unhandled exception occurred while attempting to execute {}",
                call
            ),
            Some(context),
            location,
        );
    }
}

impl Debug for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer")
            .field("logger", &self.logger.name())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {}", message)
    } else {
        "panicked".to_string()
    }
}

/// A function bound to a [`Tracer`]; see [`Tracer::wrap`].
pub struct Traced<F> {
    tracer: Tracer,
    function: Cow<'static, str>,
    f: F,
}

impl<F> Traced<F> {
    pub fn function(&self) -> &str {
        &self.function
    }

    #[track_caller]
    pub fn call<A, R>(&self, args: A) -> R
    where
        F: Fn(A) -> R,
        A: IntoCallArgs,
        R: Debug,
    {
        let location = Location::caller();
        let call_args = args.to_call_args();

        match self.tracer.run(&self.function, &call_args, location, || {
            Ok::<R, Infallible>((self.f)(args))
        }) {
            Ok(result) => result,
            Err(never) => match never {},
        }
    }

    #[track_caller]
    pub fn try_call<A, T, E>(&self, args: A) -> std::result::Result<T, E>
    where
        F: Fn(A) -> std::result::Result<T, E>,
        A: IntoCallArgs,
        T: Debug,
        E: Debug,
    {
        let location = Location::caller();
        let call_args = args.to_call_args();

        self.tracer
            .run(&self.function, &call_args, location, || (self.f)(args))
    }
}
