//! weave —— 无反射的依赖注入容器
//!
//! 以不可变的 Bean 定义描述符为输入（由外部元数据生产者按确定顺序
//! 注册），提供类型安全的解析、限定符匹配、条件装配、单例/原型/
//! 自定义作用域生命周期，以及基于显式分发代理的方法拦截。
//!
//! # 快速上手
//!
//! ```
//! use weave::{BeanDefinition, Container, InjectionPoint};
//! use std::sync::Arc;
//!
//! struct Engine { cylinders: u32 }
//! struct Vehicle { engine: Arc<Engine> }
//!
//! let container = Container::builder()
//!     .register(
//!         BeanDefinition::of::<Engine>()
//!             .named("engine")
//!             .constructor(|_| Ok(Engine { cylinders: 8 }))
//!             .build(),
//!     )
//!     .register(
//!         BeanDefinition::of::<Vehicle>()
//!             .named("vehicle")
//!             .inject(InjectionPoint::one::<Engine>())
//!             .constructor(|args| Ok(Vehicle { engine: args.get::<Engine>(0)? }))
//!             .build(),
//!     )
//!     .build();
//!
//! let vehicle = container.resolve::<Vehicle>().unwrap();
//! assert_eq!(vehicle.engine.cylinders, 8);
//! ```

pub mod condition;
pub mod container;
pub mod definition;
pub mod env;
pub mod error;
pub mod interceptor;
mod matcher;
pub mod scope;

pub use condition::Condition;
pub use container::{Container, ContainerBuilder, ContainerStats, Deferred, FactoryArgs};
pub use definition::{
    AnyInstance, BeanDefinition, BeanDefinitionBuilder, BoxError, Cardinality, InjectionPoint,
    Qualifier, ScopeKind, TerminalFn, TypeKey,
};
pub use env::Environment;
pub use error::ContainerError;
pub use interceptor::{Args, Intercepted, Invocation, MethodInterceptor};
pub use scope::{CustomScope, MapScope, ScopeInfo};
