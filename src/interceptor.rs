//! 拦截器链与分发代理
//!
//! 不依赖运行时字节码生成：每个被拦截的 Bean 在首次构造时得到一个
//! 显式的分发对象 `Intercepted<T>`，按方法名持有有序的拦截器链。
//! 方法调用构建 `Invocation` 上下文穿过链条，末端落到真实实例的
//! 方法体；introduction Bean 没有末端，链条耗尽即为致命配置错误。

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::definition::TerminalFn;
use crate::error::ContainerError;

/// 擦除后的参数列表。拦截器可以读取、替换参数。
#[derive(Default)]
pub struct Args(Vec<Box<dyn Any + Send>>);

impl Args {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push<A: Any + Send>(&mut self, value: A) {
        self.0.push(Box::new(value));
    }

    /// Builder 风格追加
    pub fn with<A: Any + Send>(mut self, value: A) -> Self {
        self.push(value);
        self
    }

    pub fn get<A: Any>(&self, index: usize) -> Option<&A> {
        self.0.get(index).and_then(|v| v.downcast_ref::<A>())
    }

    pub fn get_mut<A: Any>(&mut self, index: usize) -> Option<&mut A> {
        self.0.get_mut(index).and_then(|v| v.downcast_mut::<A>())
    }

    /// 替换指定位置的参数
    pub fn set<A: Any + Send>(&mut self, index: usize, value: A) {
        if index < self.0.len() {
            self.0[index] = Box::new(value);
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Args(len={})", self.0.len())
    }
}

/// 构建 `Args` 的便捷宏：`args![1, "s".to_string()]`
#[macro_export]
macro_rules! args {
    () => { $crate::Args::new() };
    ($($v:expr),+ $(,)?) => {{
        let mut a = $crate::Args::new();
        $( a.push($v); )+
        a
    }};
}

/// 一条横切行为。拦截器可以检查/替换参数、短路返回、
/// 调用 `invocation.proceed()` 进入下一环并对结果做后处理，
/// 或者让下游错误原样传播。
pub trait MethodInterceptor: Send + Sync {
    fn intercept(
        &self,
        invocation: &mut Invocation<'_>,
    ) -> Result<Box<dyn Any + Send>, ContainerError>;
}

pub(crate) type ErasedTerminal =
    Arc<dyn Fn(&mut Args) -> Result<Box<dyn Any + Send>, ContainerError> + Send + Sync>;

/// 绑定到单个方法签名的有序拦截器链，由容器在构造期装配
pub struct MethodChain {
    pub(crate) method: String,
    pub(crate) interceptors: Vec<Arc<dyn MethodInterceptor>>,
}

impl MethodChain {
    pub(crate) fn new(method: String, interceptors: Vec<Arc<dyn MethodInterceptor>>) -> Self {
        Self {
            method,
            interceptors,
        }
    }
}

/// 一次方法调用的上下文：方法标识、参数，以及推进到下一环的句柄
pub struct Invocation<'a> {
    bean: &'a str,
    method: &'a str,
    args: Args,
    chain: &'a [Arc<dyn MethodInterceptor>],
    position: usize,
    terminal: Option<&'a ErasedTerminal>,
}

impl Invocation<'_> {
    pub fn bean(&self) -> &str {
        self.bean
    }

    pub fn method(&self) -> &str {
        self.method
    }

    pub fn args(&self) -> &Args {
        &self.args
    }

    pub fn args_mut(&mut self) -> &mut Args {
        &mut self.args
    }

    /// 调用链上的下一环；最后一环调用真实方法体。
    /// introduction Bean 没有方法体——链条耗尽时报
    /// `UnimplementedIntroduction`。
    pub fn proceed(&mut self) -> Result<Box<dyn Any + Send>, ContainerError> {
        match self.chain.get(self.position) {
            Some(next) => {
                let next = next.clone();
                self.position += 1;
                next.intercept(self)
            }
            None => match self.terminal {
                Some(terminal) => terminal(&mut self.args),
                None => Err(ContainerError::UnimplementedIntroduction {
                    bean: self.bean.to_string(),
                    method: self.method.to_string(),
                }),
            },
        }
    }
}

struct ErasedMethod {
    chain: Vec<Arc<dyn MethodInterceptor>>,
    terminal: Option<ErasedTerminal>,
}

/// 分发代理：暴露与底层 Bean 相同的方法面，按方法名分发。
/// 链序在装配时固定，对同一定义可复现。
pub struct Intercepted<T: Send + Sync + 'static> {
    bean: String,
    target: Option<Arc<T>>,
    methods: HashMap<String, ErasedMethod>,
}

impl<T: Send + Sync + 'static> fmt::Debug for Intercepted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Intercepted")
            .field("bean", &self.bean)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<T: Send + Sync + 'static> Intercepted<T> {
    pub(crate) fn assemble(
        bean: &str,
        target: Option<Arc<T>>,
        table: &[(String, Option<TerminalFn<T>>)],
        chains: Vec<MethodChain>,
    ) -> Self {
        let mut by_name: HashMap<String, Vec<Arc<dyn MethodInterceptor>>> = chains
            .into_iter()
            .map(|c| (c.method, c.interceptors))
            .collect();

        let mut methods = HashMap::with_capacity(table.len());
        for (name, terminal) in table {
            let chain = by_name.remove(name).unwrap_or_default();
            let terminal = match (terminal, &target) {
                (Some(body), Some(instance)) => {
                    let body = body.clone();
                    let instance = instance.clone();
                    let bean = bean.to_string();
                    let method = name.clone();
                    Some(Arc::new(move |args: &mut Args| {
                        body(&instance, args).map_err(|e| ContainerError::InvocationFailed {
                            bean: bean.clone(),
                            method: method.clone(),
                            reason: e.to_string(),
                        })
                    }) as ErasedTerminal)
                }
                _ => None,
            };
            methods.insert(
                name.clone(),
                ErasedMethod { chain, terminal },
            );
        }

        Self {
            bean: bean.to_string(),
            target,
            methods,
        }
    }

    /// 底层实例；introduction Bean 返回 None
    pub fn target(&self) -> Option<Arc<T>> {
        self.target.clone()
    }

    pub fn bean_name(&self) -> &str {
        &self.bean
    }

    /// 通过拦截器链调用方法
    pub fn invoke(&self, method: &str, args: Args) -> Result<Box<dyn Any + Send>, ContainerError> {
        let entry = self
            .methods
            .get(method)
            .ok_or_else(|| ContainerError::NoSuchMethod {
                bean: self.bean.clone(),
                method: method.to_string(),
            })?;
        let mut invocation = Invocation {
            bean: &self.bean,
            method,
            args,
            chain: &entry.chain,
            position: 0,
            terminal: entry.terminal.as_ref(),
        };
        invocation.proceed()
    }
}
