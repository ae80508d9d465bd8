//! Bean 定义描述符
//!
//! 容器消费的不可变元数据：类型标识（含泛型参数）、限定符、作用域、
//! 注入点、工厂策略、启用条件、生命周期回调、拦截方法表与事件监听绑定。
//! 描述符由外部元数据生产者以确定顺序注册——这里提供的类型化 Builder
//! 就是那份契约的无反射实现，容器不关心描述符由何种机制生成。

use std::any::{Any, TypeId};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::condition::Condition;
use crate::container::FactoryArgs;
use crate::error::ContainerError;
use crate::interceptor::{Args, Intercepted, MethodChain};

/// 类型擦除后的 Bean 实例
pub type AnyInstance = Arc<dyn Any + Send + Sync>;
/// 工厂与回调使用的通用错误类型
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 类型标识：`TypeId` 加显式泛型参数键。
/// 支持 `?Sized`，因此 trait 对象也可以作为解析键。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
    args: Vec<TypeKey>,
}

impl TypeKey {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            args: Vec::new(),
        }
    }

    /// 附加显式泛型参数键（用于泛型约束匹配）
    pub fn with_args(mut self, args: Vec<TypeKey>) -> Self {
        self.args = args;
        self
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub(crate) fn args(&self) -> &[TypeKey] {
        &self.args
    }

    /// 判断请求键是否可由声明键满足：标识一致，且请求未约束泛型参数
    /// 或泛型参数完全一致。
    pub(crate) fn satisfied_by(&self, declared: &TypeKey) -> bool {
        self.id == declared.id && (self.args.is_empty() || self.args == declared.args)
    }

    /// 去掉模块路径的可读名称，用于错误与日志
    pub fn display_name(&self) -> String {
        let base = short_type_name(self.name);
        if self.args.is_empty() {
            base
        } else {
            let args: Vec<String> = self.args.iter().map(|a| a.display_name()).collect();
            format!("{base}[{}]", args.join(", "))
        }
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

fn short_type_name(full: &str) -> String {
    let mut out = String::with_capacity(full.len());
    let mut word = String::new();
    for c in full.chars() {
        if c.is_alphanumeric() || c == '_' {
            word.push(c);
        } else if c == ':' {
            word.clear();
        } else {
            out.push_str(&word);
            word.clear();
            out.push(c);
        }
    }
    out.push_str(&word);
    out
}

/// 构建 `TypeKey` 的便捷宏：`type_key!(Engine)` 或 `type_key!(Repo; User, u64)`
#[macro_export]
macro_rules! type_key {
    ($t:ty) => {
        $crate::TypeKey::of::<$t>()
    };
    ($t:ty; $($arg:ty),+ $(,)?) => {
        $crate::TypeKey::of::<$t>().with_args(vec![$($crate::TypeKey::of::<$arg>()),+])
    };
}

/// 依赖请求的判别器，仅用于匹配，自身不携带标识
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Qualifier {
    /// 不限定：匹配任意候选
    None,
    /// 名称限定
    Name(String),
    /// 注解形限定：名称 + 属性表
    Annotation {
        name: String,
        attrs: BTreeMap<String, serde_json::Value>,
    },
    /// 泛型参数约束
    TypeArgs(Vec<TypeKey>),
}

impl Qualifier {
    pub fn name(name: impl Into<String>) -> Self {
        Qualifier::Name(name.into())
    }

    pub fn annotation(
        name: impl Into<String>,
        attrs: impl IntoIterator<Item = (String, serde_json::Value)>,
    ) -> Self {
        Qualifier::Annotation {
            name: name.into(),
            attrs: attrs.into_iter().collect(),
        }
    }

    pub(crate) fn describe(&self) -> Option<String> {
        match self {
            Qualifier::None => None,
            Qualifier::Name(n) => Some(format!("name '{n}'")),
            Qualifier::Annotation { name, .. } => Some(format!("annotation '@{name}'")),
            Qualifier::TypeArgs(args) => {
                let names: Vec<String> = args.iter().map(|a| a.display_name()).collect();
                Some(format!("type args [{}]", names.join(", ")))
            }
        }
    }
}

/// 作用域种类
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeKind {
    /// 单例：容器生命周期内恰好一个实例
    Singleton,
    /// 原型：每次解析都构造新实例，容器不负责销毁
    Prototype,
    /// 自定义作用域，按名称查找已注册的作用域实现
    Custom(String),
}

/// 注入点基数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// 必需的单值依赖，解析失败立即向上传播
    One,
    /// 可选依赖，候选缺失时注入“缺席”而不是失败
    Optional,
    /// 按优先级排序的全部匹配
    All,
    /// 延迟句柄，构造期不解析（自引用/惰性依赖的出口）
    Deferred,
}

/// 一个构造参数的依赖声明
#[derive(Debug, Clone)]
pub struct InjectionPoint {
    pub(crate) target: TypeKey,
    pub(crate) qualifier: Qualifier,
    pub(crate) cardinality: Cardinality,
}

impl InjectionPoint {
    pub fn one<T: ?Sized + 'static>() -> Self {
        Self {
            target: TypeKey::of::<T>(),
            qualifier: Qualifier::None,
            cardinality: Cardinality::One,
        }
    }

    pub fn optional<T: ?Sized + 'static>() -> Self {
        Self {
            cardinality: Cardinality::Optional,
            ..Self::one::<T>()
        }
    }

    pub fn all<T: ?Sized + 'static>() -> Self {
        Self {
            cardinality: Cardinality::All,
            ..Self::one::<T>()
        }
    }

    pub fn deferred<T: ?Sized + 'static>() -> Self {
        Self {
            cardinality: Cardinality::Deferred,
            ..Self::one::<T>()
        }
    }

    /// 附加限定符
    pub fn qualified(mut self, qualifier: Qualifier) -> Self {
        self.qualifier = qualifier;
        self
    }

    /// 覆盖目标键（显式泛型参数等场景）
    pub fn with_key(mut self, key: TypeKey) -> Self {
        self.target = key;
        self
    }
}

pub(crate) type ConstructorFn =
    Arc<dyn Fn(&FactoryArgs<'_>) -> Result<AnyInstance, BoxError> + Send + Sync>;
pub(crate) type FactoryMethodFn =
    Arc<dyn Fn(&AnyInstance, &FactoryArgs<'_>) -> Result<AnyInstance, BoxError> + Send + Sync>;

/// 工厂策略：构造函数、工厂方法或纯拦截（introduction）
#[derive(Clone)]
pub(crate) enum FactoryStrategy {
    Constructor(ConstructorFn),
    FactoryMethod {
        parent: TypeKey,
        parent_qualifier: Qualifier,
        method: FactoryMethodFn,
    },
    /// 无后备实现，行为完全由拦截器提供
    Introduction,
}

pub(crate) type HookFn = Arc<dyn Fn(&AnyInstance) -> Result<(), BoxError> + Send + Sync>;

/// 向其他类型键（通常是 trait 对象）的暴露转换。
/// 转换结果以 `Arc<Arc<dyn Trait>>` 形式存储再擦除，解析端按 `Arc<T>` 取回。
#[derive(Clone)]
pub(crate) struct Exposure {
    pub(crate) key: TypeKey,
    pub(crate) cast: Arc<dyn Fn(&AnyInstance) -> Option<AnyInstance> + Send + Sync>,
}

pub(crate) type ProxyFactoryFn = Arc<
    dyn Fn(Option<AnyInstance>, Vec<MethodChain>, &str) -> Result<AnyInstance, ContainerError>
        + Send
        + Sync,
>;

/// 被拦截方法的声明：方法名 + 有序的拦截器限定符
#[derive(Clone)]
pub(crate) struct MethodBinding {
    pub(crate) name: String,
    pub(crate) interceptors: Vec<Qualifier>,
}

/// 拦截元数据：方法表（声明顺序即平局裁决顺序）与类型化代理工厂
#[derive(Clone)]
pub(crate) struct InterceptionMeta {
    pub(crate) methods: Vec<MethodBinding>,
    pub(crate) proxy_factory: ProxyFactoryFn,
}

/// 事件监听绑定：声明的事件类型与擦除后的调用闭包
#[derive(Clone)]
pub(crate) struct ListenerBinding {
    pub(crate) event_type: TypeId,
    pub(crate) event_name: &'static str,
    pub(crate) invoke: Arc<dyn Fn(&AnyInstance, &dyn Any) -> Result<(), BoxError> + Send + Sync>,
}

/// 一个可构造类型的不可变描述符。注册后不再变化；
/// 同一声明类型可以有多个描述符共存（多态候选）。
#[derive(Clone)]
pub struct BeanDefinition {
    pub(crate) type_key: TypeKey,
    pub(crate) name: String,
    pub(crate) qualifiers: Vec<Qualifier>,
    pub(crate) scope: ScopeKind,
    pub(crate) condition: Condition,
    pub(crate) injection_points: Vec<InjectionPoint>,
    pub(crate) factory: FactoryStrategy,
    pub(crate) exposures: Vec<Exposure>,
    pub(crate) post_construct: Option<HookFn>,
    pub(crate) pre_destroy: Option<HookFn>,
    pub(crate) interception: Option<InterceptionMeta>,
    pub(crate) listener: Option<ListenerBinding>,
    pub(crate) primary: bool,
    pub(crate) priority: i32,
    pub(crate) eager: bool,
}

impl BeanDefinition {
    /// 进入类型化 Builder
    pub fn of<T: Send + Sync + 'static>() -> BeanDefinitionBuilder<T> {
        BeanDefinitionBuilder::new()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_key(&self) -> &TypeKey {
        &self.type_key
    }

    pub fn scope(&self) -> &ScopeKind {
        &self.scope
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    pub fn is_eager(&self) -> bool {
        self.eager
    }

    pub fn is_intercepted(&self) -> bool {
        self.interception.is_some()
    }

    /// 声明键或任一暴露键可满足请求键
    pub(crate) fn matches_key(&self, requested: &TypeKey) -> bool {
        requested.satisfied_by(&self.type_key)
            || self.exposures.iter().any(|e| requested.satisfied_by(&e.key))
    }

    pub(crate) fn exposure_for(&self, requested: &TypeKey) -> Option<&Exposure> {
        self.exposures.iter().find(|e| requested.satisfied_by(&e.key))
    }

    pub(crate) fn satisfies_qualifier(&self, qualifier: &Qualifier) -> bool {
        match qualifier {
            Qualifier::None => true,
            Qualifier::Name(n) => self
                .qualifiers
                .iter()
                .any(|q| matches!(q, Qualifier::Name(dn) if dn == n)),
            Qualifier::Annotation { .. } => self.qualifiers.iter().any(|q| q == qualifier),
            Qualifier::TypeArgs(args) => {
                self.type_key.args() == args.as_slice()
                    || self.exposures.iter().any(|e| e.key.args() == args.as_slice())
            }
        }
    }
}

impl fmt::Debug for BeanDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanDefinition")
            .field("name", &self.name)
            .field("type", &self.type_key.display_name())
            .field("scope", &self.scope)
            .field("primary", &self.primary)
            .field("priority", &self.priority)
            .field("eager", &self.eager)
            .field("intercepted", &self.interception.is_some())
            .finish()
    }
}

type TypedHook<T> = Arc<dyn Fn(&T) -> Result<(), BoxError> + Send + Sync>;

/// 被拦截方法的终端处理器：在真实实例上执行实际方法体
pub type TerminalFn<T> =
    Arc<dyn Fn(&T, &mut Args) -> Result<Box<dyn Any + Send>, BoxError> + Send + Sync>;

struct TypedMethod<T> {
    name: String,
    interceptors: Vec<Qualifier>,
    terminal: Option<TerminalFn<T>>,
}

/// 类型化的描述符 Builder。
/// 注册顺序由调用方（元数据生产者）决定，Builder 自身不做任何扫描。
pub struct BeanDefinitionBuilder<T: Send + Sync + 'static> {
    type_key: TypeKey,
    name: Option<String>,
    qualifiers: Vec<Qualifier>,
    scope: ScopeKind,
    condition: Condition,
    injection_points: Vec<InjectionPoint>,
    factory: Option<FactoryStrategy>,
    exposures: Vec<Exposure>,
    post_construct: Option<TypedHook<T>>,
    pre_destroy: Option<TypedHook<T>>,
    methods: Vec<TypedMethod<T>>,
    listener_typed: Option<Arc<dyn Fn(&T, &dyn Any) -> Result<(), BoxError> + Send + Sync>>,
    listener_event: Option<(TypeId, &'static str)>,
    primary: bool,
    priority: i32,
    eager: bool,
}

impl<T: Send + Sync + 'static> BeanDefinitionBuilder<T> {
    fn new() -> Self {
        Self {
            type_key: TypeKey::of::<T>(),
            name: None,
            qualifiers: Vec::new(),
            scope: ScopeKind::Singleton,
            condition: Condition::Always,
            injection_points: Vec::new(),
            factory: None,
            exposures: Vec::new(),
            post_construct: None,
            pre_destroy: None,
            methods: Vec::new(),
            listener_typed: None,
            listener_event: None,
            primary: false,
            priority: 0,
            eager: false,
        }
    }

    /// 设置显示名称，同时作为名称限定符注册
    pub fn named(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.qualifiers.push(Qualifier::Name(name.clone()));
        self.name = Some(name);
        self
    }

    /// 附加限定符（注解形、泛型约束等）
    pub fn qualified(mut self, qualifier: Qualifier) -> Self {
        self.qualifiers.push(qualifier);
        self
    }

    /// 声明显式泛型参数键
    pub fn type_args(mut self, args: Vec<TypeKey>) -> Self {
        self.type_key = self.type_key.with_args(args);
        self
    }

    pub fn scope(mut self, scope: ScopeKind) -> Self {
        self.scope = scope;
        self
    }

    pub fn prototype(self) -> Self {
        self.scope(ScopeKind::Prototype)
    }

    pub fn custom_scope(self, name: impl Into<String>) -> Self {
        self.scope(ScopeKind::Custom(name.into()))
    }

    pub fn condition(mut self, condition: Condition) -> Self {
        self.condition = condition;
        self
    }

    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// 容器 start() 时立即构造（仅单例有意义）
    pub fn eager(mut self) -> Self {
        self.eager = true;
        self
    }

    /// 声明一个注入点；工厂通过 `FactoryArgs` 按声明顺序取值
    pub fn inject(mut self, point: InjectionPoint) -> Self {
        self.injection_points.push(point);
        self
    }

    /// 构造函数策略
    pub fn constructor(
        mut self,
        f: impl Fn(&FactoryArgs<'_>) -> Result<T, BoxError> + Send + Sync + 'static,
    ) -> Self {
        self.factory = Some(FactoryStrategy::Constructor(Arc::new(move |args| {
            Ok(Arc::new(f(args)?) as AnyInstance)
        })));
        self
    }

    /// 工厂方法策略：先解析父 Bean，再在其上调用工厂方法
    pub fn factory_method<P: Send + Sync + 'static>(
        mut self,
        parent_qualifier: Qualifier,
        f: impl Fn(&P, &FactoryArgs<'_>) -> Result<T, BoxError> + Send + Sync + 'static,
    ) -> Self {
        let method: FactoryMethodFn = Arc::new(move |parent, args| {
            let parent = parent.clone().downcast::<P>().map_err(|_| -> BoxError {
                format!(
                    "factory parent type mismatch: expected {}",
                    std::any::type_name::<P>()
                )
                .into()
            })?;
            Ok(Arc::new(f(&parent, args)?) as AnyInstance)
        });
        self.factory = Some(FactoryStrategy::FactoryMethod {
            parent: TypeKey::of::<P>(),
            parent_qualifier,
            method,
        });
        self
    }

    /// Introduction 策略：没有后备实现，行为完全由拦截器提供
    pub fn introduction(mut self) -> Self {
        self.factory = Some(FactoryStrategy::Introduction);
        self
    }

    /// 向抽象键（trait 对象）暴露本 Bean。
    /// 被拦截的 Bean 不支持按暴露键解析——代理只能通过 `resolve_proxy` 获取。
    pub fn exposes<A>(mut self, cast: fn(Arc<T>) -> Arc<A>) -> Self
    where
        A: ?Sized + Send + Sync + 'static,
    {
        let erased = Arc::new(move |instance: &AnyInstance| -> Option<AnyInstance> {
            let concrete = instance.clone().downcast::<T>().ok()?;
            Some(Arc::new(cast(concrete)) as AnyInstance)
        });
        self.exposures.push(Exposure {
            key: TypeKey::of::<A>(),
            cast: erased,
        });
        self
    }

    /// 带显式泛型参数键的暴露
    pub fn exposes_with_key<A>(mut self, key: TypeKey, cast: fn(Arc<T>) -> Arc<A>) -> Self
    where
        A: ?Sized + Send + Sync + 'static,
    {
        let erased = Arc::new(move |instance: &AnyInstance| -> Option<AnyInstance> {
            let concrete = instance.clone().downcast::<T>().ok()?;
            Some(Arc::new(cast(concrete)) as AnyInstance)
        });
        self.exposures.push(Exposure { key, cast: erased });
        self
    }

    /// 构造完成后、发布前执行的回调
    pub fn post_construct(
        mut self,
        f: impl Fn(&T) -> Result<(), BoxError> + Send + Sync + 'static,
    ) -> Self {
        self.post_construct = Some(Arc::new(f));
        self
    }

    /// 所属作用域销毁时执行的回调
    pub fn pre_destroy(
        mut self,
        f: impl Fn(&T) -> Result<(), BoxError> + Send + Sync + 'static,
    ) -> Self {
        self.pre_destroy = Some(Arc::new(f));
        self
    }

    /// 同名方法的重复声明合并为一条：拦截器按声明顺序追加，
    /// 后声明的终端方法体覆盖先前的
    fn push_method(
        &mut self,
        name: String,
        interceptors: Vec<Qualifier>,
        terminal: Option<TerminalFn<T>>,
    ) {
        if let Some(existing) = self.methods.iter_mut().find(|m| m.name == name) {
            existing.interceptors.extend(interceptors);
            if terminal.is_some() {
                existing.terminal = terminal;
            }
        } else {
            self.methods.push(TypedMethod {
                name,
                interceptors,
                terminal,
            });
        }
    }

    /// 声明一个被拦截的方法：有序的拦截器限定符 + 终端方法体
    pub fn intercept_method(
        mut self,
        name: impl Into<String>,
        interceptors: Vec<Qualifier>,
        terminal: impl Fn(&T, &mut Args) -> Result<Box<dyn Any + Send>, BoxError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.push_method(name.into(), interceptors, Some(Arc::new(terminal)));
        self
    }

    /// 声明一个没有方法体的方法（introduction 风格），
    /// 链上若无拦截器产出结果则为致命配置错误。
    pub fn introduction_method(
        mut self,
        name: impl Into<String>,
        interceptors: Vec<Qualifier>,
    ) -> Self {
        self.push_method(name.into(), interceptors, None);
        self
    }

    /// 声明本 Bean 监听事件类型 `E`
    pub fn listens<E: Any + Send + Sync>(
        mut self,
        f: impl Fn(&T, &E) -> Result<(), BoxError> + Send + Sync + 'static,
    ) -> Self {
        self.listener_typed = Some(Arc::new(move |target: &T, event: &dyn Any| {
            let event = event.downcast_ref::<E>().ok_or_else(|| -> BoxError {
                format!("event type mismatch: expected {}", std::any::type_name::<E>()).into()
            })?;
            f(target, event)
        }));
        self.listener_event = Some((TypeId::of::<E>(), std::any::type_name::<E>()));
        self
    }

    /// 固化为不可变描述符
    pub fn build(mut self) -> BeanDefinition {
        let name = self
            .name
            .take()
            .unwrap_or_else(|| self.type_key.display_name());
        let intercepted = !self.methods.is_empty();

        let factory = self.factory.take().unwrap_or_else(|| {
            if intercepted {
                FactoryStrategy::Introduction
            } else {
                // 未声明工厂策略：解析时报错而不是在注册时 panic
                FactoryStrategy::Constructor(Arc::new(|_| {
                    Err("no factory strategy declared for this bean".into())
                }))
            }
        });

        let interception = if intercepted {
            let bindings: Vec<MethodBinding> = self
                .methods
                .iter()
                .map(|m| MethodBinding {
                    name: m.name.clone(),
                    interceptors: m.interceptors.clone(),
                })
                .collect();
            let table: Vec<(String, Option<TerminalFn<T>>)> = self
                .methods
                .iter()
                .map(|m| (m.name.clone(), m.terminal.clone()))
                .collect();
            let proxy_factory: ProxyFactoryFn =
                Arc::new(move |raw, chains, bean_name| {
                    let target: Option<Arc<T>> = match raw {
                        Some(instance) => Some(instance.downcast::<T>().map_err(|_| {
                            ContainerError::TypeMismatch {
                                expected: std::any::type_name::<T>().to_string(),
                                context: format!("building proxy for '{bean_name}'"),
                            }
                        })?),
                        None => None,
                    };
                    Ok(Arc::new(Intercepted::assemble(bean_name, target, &table, chains))
                        as AnyInstance)
                });
            Some(InterceptionMeta {
                methods: bindings,
                proxy_factory,
            })
        } else {
            None
        };

        let post_construct = self
            .post_construct
            .take()
            .map(|h| erase_hook(h, intercepted));
        let pre_destroy = self.pre_destroy.take().map(|h| erase_hook(h, intercepted));

        let listener = match (self.listener_typed.take(), self.listener_event) {
            (Some(invoke), Some((event_type, event_name))) => {
                let unwrap = erase_target::<T>(intercepted);
                Some(ListenerBinding {
                    event_type,
                    event_name,
                    invoke: Arc::new(move |instance, event| {
                        let target = unwrap(instance)?;
                        invoke(&target, event)
                    }),
                })
            }
            _ => None,
        };

        BeanDefinition {
            type_key: self.type_key,
            name,
            qualifiers: self.qualifiers,
            scope: self.scope,
            condition: self.condition,
            injection_points: self.injection_points,
            factory,
            exposures: self.exposures,
            post_construct,
            pre_destroy,
            interception,
            listener,
            primary: self.primary,
            priority: self.priority,
            eager: self.eager,
        }
    }
}

/// 擦除后的目标取回：普通 Bean 直接向下转型；
/// 被拦截 Bean 先取代理再取其后备实例。
fn erase_target<T: Send + Sync + 'static>(
    intercepted: bool,
) -> impl Fn(&AnyInstance) -> Result<Arc<T>, BoxError> + Send + Sync {
    move |instance: &AnyInstance| {
        if intercepted {
            let proxy = instance
                .clone()
                .downcast::<Intercepted<T>>()
                .map_err(|_| -> BoxError { "proxy type mismatch in lifecycle binding".into() })?;
            proxy.target().ok_or_else(|| -> BoxError {
                "lifecycle binding requires a backing instance (introduction bean has none)".into()
            })
        } else {
            instance
                .clone()
                .downcast::<T>()
                .map_err(|_| -> BoxError { "instance type mismatch in lifecycle binding".into() })
        }
    }
}

fn erase_hook<T: Send + Sync + 'static>(hook: TypedHook<T>, intercepted: bool) -> HookFn {
    let unwrap = erase_target::<T>(intercepted);
    Arc::new(move |instance: &AnyInstance| {
        let target = unwrap(instance)?;
        hook(&target)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Engine;
    trait Movable: Send + Sync {}
    impl Movable for Engine {}

    #[test]
    fn type_key_display_strips_paths() {
        let key = TypeKey::of::<std::string::String>();
        assert_eq!(key.display_name(), "String");

        let generic = type_key!(Vec<String>; String);
        assert_eq!(generic.display_name(), "Vec<String>[String]");
    }

    #[test]
    fn request_without_args_matches_any_declared_args() {
        let declared = type_key!(Engine; String);
        let plain = type_key!(Engine);
        assert!(plain.satisfied_by(&declared));
        assert!(!type_key!(Engine; u32).satisfied_by(&declared));
        assert!(type_key!(Engine; String).satisfied_by(&declared));
    }

    #[test]
    fn builder_defaults() {
        let def = BeanDefinition::of::<Engine>()
            .constructor(|_| Ok(Engine))
            .build();
        assert_eq!(def.name(), "Engine");
        assert_eq!(def.scope(), &ScopeKind::Singleton);
        assert_eq!(def.priority(), 0);
        assert!(!def.is_primary());
        assert!(!def.is_eager());
    }

    #[test]
    fn named_builder_registers_name_qualifier() {
        let def = BeanDefinition::of::<Engine>()
            .named("v8")
            .constructor(|_| Ok(Engine))
            .build();
        assert_eq!(def.name(), "v8");
        assert!(def.satisfies_qualifier(&Qualifier::name("v8")));
        assert!(!def.satisfies_qualifier(&Qualifier::name("v6")));
        assert!(def.satisfies_qualifier(&Qualifier::None));
    }

    #[test]
    fn exposure_matches_trait_key() {
        let def = BeanDefinition::of::<Engine>()
            .constructor(|_| Ok(Engine))
            .exposes::<dyn Movable>(|e| e)
            .build();
        assert!(def.matches_key(&TypeKey::of::<dyn Movable>()));
        assert!(def.matches_key(&TypeKey::of::<Engine>()));
        assert!(!def.matches_key(&TypeKey::of::<String>()));
    }

    #[test]
    fn annotation_qualifier_equality_includes_attrs() {
        let q1 = Qualifier::annotation(
            "cacheable",
            [("region".to_string(), serde_json::json!("users"))],
        );
        let q2 = Qualifier::annotation(
            "cacheable",
            [("region".to_string(), serde_json::json!("orders"))],
        );
        let def = BeanDefinition::of::<Engine>()
            .qualified(q1.clone())
            .constructor(|_| Ok(Engine))
            .build();
        assert!(def.satisfies_qualifier(&q1));
        assert!(!def.satisfies_qualifier(&q2));
    }
}
