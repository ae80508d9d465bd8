//! 解析引擎与容器生命周期
//!
//! 容器是被动的阻塞式服务：注册表在 `build()` 之后只读，所有可变
//! 状态集中在单例注册表与自定义作用域缓存里。解析递归沿注入点下行，
//! 携带同一个构造栈帧；单例走单飞纪律，原型每次新建，自定义作用域
//! 查缓存。被拦截的 Bean 在首次构造时装配拦截器链并以分发代理的
//! 形态发布。`close()` 按构造完成的逆序执行销毁回调。

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::de::DeserializeOwned;

use crate::definition::{AnyInstance, BeanDefinition, FactoryStrategy, ScopeKind};
use crate::definition::{Cardinality, Qualifier, TypeKey};
use crate::env::Environment;
use crate::error::ContainerError;
use crate::interceptor::{Intercepted, MethodChain, MethodInterceptor};
use crate::matcher::{filter_candidates, select_all, select_one, Candidate, MatchRequest, SelectError};
use crate::scope::{Claim, ConstructionFrame, CustomScope, DefId, SingletonRegistry};

/// 运行期计数器（快照见 [`ContainerStats`]）
#[derive(Default)]
struct InnerStats {
    resolutions: AtomicU64,
    singleton_hits: AtomicU64,
    singleton_misses: AtomicU64,
    prototype_constructions: AtomicU64,
}

/// 容器统计快照
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct ContainerStats {
    pub resolutions: u64,
    pub singleton_hits: u64,
    pub singleton_misses: u64,
    pub prototype_constructions: u64,
}

impl ContainerStats {
    /// 单例缓存命中率
    pub fn singleton_hit_rate(&self) -> f64 {
        let total = self.singleton_hits + self.singleton_misses;
        if total == 0 {
            0.0
        } else {
            self.singleton_hits as f64 / total as f64
        }
    }
}

struct Inner {
    env: Environment,
    definitions: Vec<Arc<BeanDefinition>>,
    /// 请求类型 -> 候选定义（声明键与暴露键都建索引）
    by_id: HashMap<TypeId, Vec<DefId>>,
    singletons: SingletonRegistry,
    scopes: DashMap<String, Arc<dyn CustomScope>>,
    resolution_seq: AtomicU64,
    started: AtomicBool,
    closed: AtomicBool,
    stats: InnerStats,
}

/// 依赖注入容器。克隆是廉价的句柄复制，所有克隆共享同一状态。
#[derive(Clone)]
pub struct Container {
    inner: Arc<Inner>,
}

/// 容器构建器：登记定义、环境与自定义作用域。
/// 注册顺序即定义的确定顺序，也是匹配平局时的裁决依据。
pub struct ContainerBuilder {
    env: Environment,
    definitions: Vec<Arc<BeanDefinition>>,
    scopes: Vec<Arc<dyn CustomScope>>,
}

impl Default for ContainerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerBuilder {
    pub fn new() -> Self {
        Self {
            env: Environment::empty(),
            definitions: Vec::new(),
            scopes: Vec::new(),
        }
    }

    /// 环境快照，条件评估与属性绑定都以它为准
    pub fn environment(mut self, env: Environment) -> Self {
        self.env = env;
        self
    }

    pub fn register(mut self, definition: BeanDefinition) -> Self {
        self.definitions.push(Arc::new(definition));
        self
    }

    pub fn register_scope(mut self, scope: Arc<dyn CustomScope>) -> Self {
        self.scopes.push(scope);
        self
    }

    /// 固化注册表并建立类型索引。构建后定义不再变化。
    pub fn build(self) -> Container {
        let mut by_id: HashMap<TypeId, Vec<DefId>> = HashMap::new();
        for (index, def) in self.definitions.iter().enumerate() {
            let id = index as DefId;
            let mut keys = vec![def.type_key().id()];
            for exposure in &def.exposures {
                if !keys.contains(&exposure.key.id()) {
                    keys.push(exposure.key.id());
                }
            }
            for key in keys {
                by_id.entry(key).or_default().push(id);
            }
        }

        let scopes = DashMap::new();
        for scope in self.scopes {
            scopes.insert(scope.name().to_string(), scope);
        }

        log::debug!("container built with {} definitions", self.definitions.len());
        Container {
            inner: Arc::new(Inner {
                env: self.env,
                definitions: self.definitions,
                by_id,
                singletons: SingletonRegistry::new(),
                scopes,
                resolution_seq: AtomicU64::new(0),
                started: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                stats: InnerStats::default(),
            }),
        }
    }
}

/// 一个已解析的注入参数
enum ResolvedArg {
    One(AnyInstance),
    Optional(Option<AnyInstance>),
    All(Vec<AnyInstance>),
    Deferred { target: TypeKey, qualifier: Qualifier },
}

/// 工厂可见的参数面：按注入点声明顺序取值，外加环境属性绑定。
pub struct FactoryArgs<'a> {
    resolved: Vec<ResolvedArg>,
    env: &'a Environment,
    container: &'a Container,
}

impl FactoryArgs<'_> {
    fn arg(&self, index: usize) -> Result<&ResolvedArg, ContainerError> {
        self.resolved
            .get(index)
            .ok_or_else(|| ContainerError::TypeMismatch {
                expected: format!("injection point #{index}"),
                context: "factory argument access out of range".to_string(),
            })
    }

    /// 必需的具体类型依赖
    pub fn get<T: Send + Sync + 'static>(&self, index: usize) -> Result<Arc<T>, ContainerError> {
        match self.arg(index)? {
            ResolvedArg::One(instance) => downcast_arc::<T>(instance, index),
            _ => Err(cardinality_mismatch::<T>(index, "One")),
        }
    }

    /// 必需的 trait 对象依赖（经暴露键解析）
    pub fn get_trait<A: ?Sized + Send + Sync + 'static>(
        &self,
        index: usize,
    ) -> Result<Arc<A>, ContainerError> {
        match self.arg(index)? {
            ResolvedArg::One(instance) => downcast_exposed_arc::<A>(instance, index),
            _ => Err(cardinality_mismatch::<Arc<A>>(index, "One")),
        }
    }

    /// 被拦截依赖的分发代理
    pub fn get_proxy<T: Send + Sync + 'static>(
        &self,
        index: usize,
    ) -> Result<Arc<Intercepted<T>>, ContainerError> {
        self.get::<Intercepted<T>>(index)
    }

    /// 可选依赖：候选缺失时为 None
    pub fn get_optional<T: Send + Sync + 'static>(
        &self,
        index: usize,
    ) -> Result<Option<Arc<T>>, ContainerError> {
        match self.arg(index)? {
            ResolvedArg::Optional(Some(instance)) => downcast_arc::<T>(instance, index).map(Some),
            ResolvedArg::Optional(None) => Ok(None),
            _ => Err(cardinality_mismatch::<T>(index, "Optional")),
        }
    }

    pub fn get_optional_trait<A: ?Sized + Send + Sync + 'static>(
        &self,
        index: usize,
    ) -> Result<Option<Arc<A>>, ContainerError> {
        match self.arg(index)? {
            ResolvedArg::Optional(Some(instance)) => {
                downcast_exposed_arc::<A>(instance, index).map(Some)
            }
            ResolvedArg::Optional(None) => Ok(None),
            _ => Err(cardinality_mismatch::<Arc<A>>(index, "Optional")),
        }
    }

    /// 全量依赖，按优先级升序
    pub fn get_all<T: Send + Sync + 'static>(
        &self,
        index: usize,
    ) -> Result<Vec<Arc<T>>, ContainerError> {
        match self.arg(index)? {
            ResolvedArg::All(instances) => instances
                .iter()
                .map(|i| downcast_arc::<T>(i, index))
                .collect(),
            _ => Err(cardinality_mismatch::<T>(index, "All")),
        }
    }

    pub fn get_all_traits<A: ?Sized + Send + Sync + 'static>(
        &self,
        index: usize,
    ) -> Result<Vec<Arc<A>>, ContainerError> {
        match self.arg(index)? {
            ResolvedArg::All(instances) => instances
                .iter()
                .map(|i| downcast_exposed_arc::<A>(i, index))
                .collect(),
            _ => Err(cardinality_mismatch::<Arc<A>>(index, "All")),
        }
    }

    /// 延迟句柄：构造期不解析，调用 `resolve()` 时以全新栈帧解析
    pub fn deferred<T: ?Sized + Send + Sync + 'static>(
        &self,
        index: usize,
    ) -> Result<Deferred<T>, ContainerError> {
        match self.arg(index)? {
            ResolvedArg::Deferred { target, qualifier } => {
                if target.id() != TypeId::of::<T>() {
                    return Err(ContainerError::TypeMismatch {
                        expected: target.display_name(),
                        context: format!("deferred injection point #{index}"),
                    });
                }
                Ok(Deferred {
                    container: self.container.clone(),
                    target: target.clone(),
                    qualifier: qualifier.clone(),
                    _marker: PhantomData,
                })
            }
            _ => Err(cardinality_mismatch::<T>(index, "Deferred")),
        }
    }

    /// 环境属性绑定（serde 反序列化）
    pub fn property<P: DeserializeOwned>(&self, name: &str) -> Result<P, ContainerError> {
        self.env.require(name)
    }

    pub fn env(&self) -> &Environment {
        self.env
    }

    pub fn container(&self) -> &Container {
        self.container
    }
}

fn downcast_arc<T: Send + Sync + 'static>(
    instance: &AnyInstance,
    index: usize,
) -> Result<Arc<T>, ContainerError> {
    instance
        .clone()
        .downcast::<T>()
        .map_err(|_| ContainerError::TypeMismatch {
            expected: std::any::type_name::<T>().to_string(),
            context: format!("factory argument #{index}"),
        })
}

/// 暴露键解析出的值以 `Arc<Arc<A>>` 存储，取回时剥一层
fn downcast_exposed_arc<A: ?Sized + Send + Sync + 'static>(
    instance: &AnyInstance,
    index: usize,
) -> Result<Arc<A>, ContainerError> {
    let wrapped = instance
        .clone()
        .downcast::<Arc<A>>()
        .map_err(|_| ContainerError::TypeMismatch {
            expected: std::any::type_name::<A>().to_string(),
            context: format!("factory argument #{index}"),
        })?;
    Ok((*wrapped).clone())
}

fn cardinality_mismatch<T: ?Sized>(index: usize, expected: &str) -> ContainerError {
    ContainerError::TypeMismatch {
        expected: std::any::type_name::<T>().to_string(),
        context: format!("injection point #{index} was not declared with cardinality {expected}"),
    }
}

/// 延迟依赖句柄。持有容器句柄与请求描述，
/// `resolve()` 在调用时以全新构造栈帧走完整解析。
pub struct Deferred<T: ?Sized + Send + Sync + 'static> {
    container: Container,
    target: TypeKey,
    qualifier: Qualifier,
    _marker: PhantomData<fn() -> Arc<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            container: self.container.clone(),
            target: self.target.clone(),
            qualifier: self.qualifier.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Send + Sync + 'static> Deferred<T> {
    /// 按具体类型解析
    pub fn resolve(&self) -> Result<Arc<T>, ContainerError> {
        let (mut frame, resolution) = self.container.begin();
        let (def, instance) = self.container.resolve_request(
            &self.target,
            &self.qualifier,
            &mut frame,
            resolution,
        )?;
        downcast_concrete::<T>(&def, instance)
    }
}

impl<T: ?Sized + Send + Sync + 'static> Deferred<T> {
    /// 按 trait 对象（暴露键）解析
    pub fn resolve_trait(&self) -> Result<Arc<T>, ContainerError> {
        let (mut frame, resolution) = self.container.begin();
        let (def, instance) = self.container.resolve_request(
            &self.target,
            &self.qualifier,
            &mut frame,
            resolution,
        )?;
        downcast_exposed::<T>(&def, instance)
    }
}

fn downcast_concrete<T: Send + Sync + 'static>(
    def: &BeanDefinition,
    instance: AnyInstance,
) -> Result<Arc<T>, ContainerError> {
    if def.is_intercepted() {
        return Err(ContainerError::TypeMismatch {
            expected: std::any::type_name::<T>().to_string(),
            context: format!(
                "bean '{}' is intercepted and must be resolved via resolve_proxy",
                def.name()
            ),
        });
    }
    instance
        .downcast::<T>()
        .map_err(|_| ContainerError::TypeMismatch {
            expected: std::any::type_name::<T>().to_string(),
            context: format!("resolving bean '{}'", def.name()),
        })
}

fn downcast_exposed<A: ?Sized + Send + Sync + 'static>(
    def: &BeanDefinition,
    instance: AnyInstance,
) -> Result<Arc<A>, ContainerError> {
    let wrapped = instance
        .downcast::<Arc<A>>()
        .map_err(|_| ContainerError::TypeMismatch {
            expected: std::any::type_name::<A>().to_string(),
            context: format!("resolving bean '{}' through an exposed key", def.name()),
        })?;
    Ok((*wrapped).clone())
}

impl Container {
    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::new()
    }

    pub fn environment(&self) -> &Environment {
        &self.inner.env
    }

    pub fn definition_count(&self) -> usize {
        self.inner.definitions.len()
    }

    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> ContainerStats {
        let stats = &self.inner.stats;
        ContainerStats {
            resolutions: stats.resolutions.load(Ordering::Relaxed),
            singleton_hits: stats.singleton_hits.load(Ordering::Relaxed),
            singleton_misses: stats.singleton_misses.load(Ordering::Relaxed),
            prototype_constructions: stats.prototype_constructions.load(Ordering::Relaxed),
        }
    }

    /// 运行期补注册自定义作用域
    pub fn register_scope(&self, scope: Arc<dyn CustomScope>) {
        self.inner.scopes.insert(scope.name().to_string(), scope);
    }

    // ---- 类型化解析面 ----

    /// 解析唯一的具体类型实例
    pub fn resolve<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, ContainerError> {
        self.resolve_with::<T>(Qualifier::None)
    }

    pub fn resolve_with<T: Send + Sync + 'static>(
        &self,
        qualifier: Qualifier,
    ) -> Result<Arc<T>, ContainerError> {
        let key = TypeKey::of::<T>();
        let (mut frame, resolution) = self.begin();
        let (def, instance) = self.resolve_request(&key, &qualifier, &mut frame, resolution)?;
        downcast_concrete::<T>(&def, instance)
    }

    /// `NoSuchBean` 被吸收为 None；其余失败照常上浮
    pub fn try_resolve<T: Send + Sync + 'static>(&self) -> Result<Option<Arc<T>>, ContainerError> {
        self.try_resolve_with::<T>(Qualifier::None)
    }

    pub fn try_resolve_with<T: Send + Sync + 'static>(
        &self,
        qualifier: Qualifier,
    ) -> Result<Option<Arc<T>>, ContainerError> {
        match self.resolve_with::<T>(qualifier) {
            Ok(instance) => Ok(Some(instance)),
            Err(e) if e.is_absence() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// 全部匹配，优先级升序，平局按注册顺序
    pub fn resolve_all<T: Send + Sync + 'static>(&self) -> Result<Vec<Arc<T>>, ContainerError> {
        self.resolve_all_with::<T>(Qualifier::None)
    }

    /// 限定符过滤后的全部匹配
    pub fn resolve_all_with<T: Send + Sync + 'static>(
        &self,
        qualifier: Qualifier,
    ) -> Result<Vec<Arc<T>>, ContainerError> {
        let key = TypeKey::of::<T>();
        let (mut frame, resolution) = self.begin();
        let matched = self.resolve_request_all(&key, &qualifier, &mut frame, resolution)?;
        matched
            .into_iter()
            .map(|(def, instance)| downcast_concrete::<T>(&def, instance))
            .collect()
    }

    /// 按暴露键（trait 对象）解析
    pub fn resolve_trait<A: ?Sized + Send + Sync + 'static>(
        &self,
    ) -> Result<Arc<A>, ContainerError> {
        self.resolve_trait_with::<A>(Qualifier::None)
    }

    pub fn resolve_trait_with<A: ?Sized + Send + Sync + 'static>(
        &self,
        qualifier: Qualifier,
    ) -> Result<Arc<A>, ContainerError> {
        let key = TypeKey::of::<A>();
        let (mut frame, resolution) = self.begin();
        let (def, instance) = self.resolve_request(&key, &qualifier, &mut frame, resolution)?;
        downcast_exposed::<A>(&def, instance)
    }

    pub fn resolve_all_traits<A: ?Sized + Send + Sync + 'static>(
        &self,
    ) -> Result<Vec<Arc<A>>, ContainerError> {
        self.resolve_all_traits_with::<A>(Qualifier::None)
    }

    pub fn resolve_all_traits_with<A: ?Sized + Send + Sync + 'static>(
        &self,
        qualifier: Qualifier,
    ) -> Result<Vec<Arc<A>>, ContainerError> {
        let key = TypeKey::of::<A>();
        let (mut frame, resolution) = self.begin();
        let matched = self.resolve_request_all(&key, &qualifier, &mut frame, resolution)?;
        matched
            .into_iter()
            .map(|(def, instance)| downcast_exposed::<A>(&def, instance))
            .collect()
    }

    /// 被拦截 Bean 的分发代理
    pub fn resolve_proxy<T: Send + Sync + 'static>(
        &self,
    ) -> Result<Arc<Intercepted<T>>, ContainerError> {
        self.resolve_proxy_with::<T>(Qualifier::None)
    }

    pub fn resolve_proxy_with<T: Send + Sync + 'static>(
        &self,
        qualifier: Qualifier,
    ) -> Result<Arc<Intercepted<T>>, ContainerError> {
        let key = TypeKey::of::<T>();
        let (mut frame, resolution) = self.begin();
        let (def, instance) = self.resolve_request(&key, &qualifier, &mut frame, resolution)?;
        if !def.is_intercepted() {
            return Err(ContainerError::TypeMismatch {
                expected: format!("Intercepted<{}>", std::any::type_name::<T>()),
                context: format!("bean '{}' declares no intercepted methods", def.name()),
            });
        }
        instance
            .downcast::<Intercepted<T>>()
            .map_err(|_| ContainerError::TypeMismatch {
                expected: format!("Intercepted<{}>", std::any::type_name::<T>()),
                context: format!("resolving proxy for bean '{}'", def.name()),
            })
    }

    // ---- 生命周期 ----

    /// 标记容器启动并按注册顺序构造急切单例。
    /// 任一急切构造失败即中止并上浮（快速失败）。
    pub fn start(&self) -> Result<(), ContainerError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(ContainerError::Closed);
        }
        self.inner.started.store(true, Ordering::SeqCst);
        let eager: Vec<(DefId, Arc<BeanDefinition>)> = self
            .inner
            .definitions
            .iter()
            .enumerate()
            .filter(|(_, def)| {
                def.is_eager()
                    && matches!(def.scope(), ScopeKind::Singleton)
                    && def.condition.matches(&self.inner.env)
            })
            .map(|(id, def)| (id as DefId, def.clone()))
            .collect();
        log::debug!("starting container: {} eager singletons", eager.len());
        for (def_id, def) in eager {
            let (mut frame, resolution) = self.begin();
            self.instantiate(def_id, &def, &mut frame, resolution)?;
        }
        Ok(())
    }

    /// 关闭容器：先按完成顺序的逆序执行单例销毁回调，再清空自定义
    /// 作用域。回调失败记录日志但不阻断其余销毁。关闭后解析报 `Closed`。
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        log::debug!("closing container");
        for (def_id, instance) in self.inner.singletons.drain() {
            if let Some(def) = self.inner.definitions.get(def_id as usize) {
                self.run_pre_destroy(def, &instance);
            }
        }
        let names: Vec<String> = self.inner.scopes.iter().map(|e| e.key().clone()).collect();
        for name in names {
            self.drain_scope(&name);
        }
    }

    /// 销毁一个自定义作用域的全部实例（插入顺序的逆序），作用域本身保留
    pub fn teardown_scope(&self, name: &str) -> Result<(), ContainerError> {
        if !self.inner.scopes.contains_key(name) {
            return Err(ContainerError::ScopeNotRegistered {
                scope: name.to_string(),
                bean: "(teardown)".to_string(),
            });
        }
        self.drain_scope(name);
        Ok(())
    }

    fn drain_scope(&self, name: &str) {
        let scope = match self.inner.scopes.get(name) {
            Some(entry) => entry.clone(),
            None => return,
        };
        for (bean, instance) in scope.drain().into_iter().rev() {
            if let Some(def) = self
                .inner
                .definitions
                .iter()
                .find(|d| d.name() == bean && matches!(d.scope(), ScopeKind::Custom(s) if s == name))
            {
                self.run_pre_destroy(def, &instance);
            }
        }
    }

    fn run_pre_destroy(&self, def: &BeanDefinition, instance: &AnyInstance) {
        if let Some(hook) = &def.pre_destroy {
            if let Err(e) = hook(instance) {
                log::warn!("pre-destroy hook of '{}' failed: {e}", def.name());
            }
        }
    }

    // ---- 事件 ----

    /// 同步派发事件给全部声明监听 `E` 且条件满足的 Bean，
    /// 按（优先级，注册顺序）排序。监听器报错即中止派发。
    pub fn publish<E: Any + Send + Sync>(&self, event: &E) -> Result<(), ContainerError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(ContainerError::Closed);
        }
        let event_type = TypeId::of::<E>();
        let mut listeners: Vec<(DefId, Arc<BeanDefinition>)> = self
            .inner
            .definitions
            .iter()
            .enumerate()
            .filter(|(_, def)| {
                def.listener
                    .as_ref()
                    .map(|l| l.event_type == event_type)
                    .unwrap_or(false)
                    && def.condition.matches(&self.inner.env)
            })
            .map(|(id, def)| (id as DefId, def.clone()))
            .collect();
        listeners.sort_by_key(|(id, def)| (def.priority(), *id));

        for (def_id, def) in listeners {
            let (mut frame, resolution) = self.begin();
            let instance = self.instantiate(def_id, &def, &mut frame, resolution)?;
            if let Some(binding) = &def.listener {
                log::debug!("dispatching {} to '{}'", binding.event_name, def.name());
                (binding.invoke)(&instance, event).map_err(|e| ContainerError::ListenerFailed {
                    bean: def.name().to_string(),
                    reason: e.to_string(),
                })?;
            }
        }
        Ok(())
    }

    // ---- 解析内核 ----

    fn begin(&self) -> (ConstructionFrame, u64) {
        (
            ConstructionFrame::new(),
            self.inner.resolution_seq.fetch_add(1, Ordering::SeqCst),
        )
    }

    fn candidates_for(&self, id: TypeId) -> Vec<Candidate> {
        match self.inner.by_id.get(&id) {
            Some(ids) => ids
                .iter()
                .filter_map(|&def_id| {
                    self.inner
                        .definitions
                        .get(def_id as usize)
                        .map(|def| (def_id, def.clone()))
                })
                .collect(),
            None => Vec::new(),
        }
    }

    /// 单值解析：匹配 -> 裁决 -> 实例化 -> 暴露转换
    fn resolve_request(
        &self,
        key: &TypeKey,
        qualifier: &Qualifier,
        frame: &mut ConstructionFrame,
        resolution: u64,
    ) -> Result<(Arc<BeanDefinition>, AnyInstance), ContainerError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(ContainerError::Closed);
        }
        self.inner.stats.resolutions.fetch_add(1, Ordering::Relaxed);

        let request = MatchRequest { key, qualifier };
        let matched = filter_candidates(&self.candidates_for(key.id()), &request, &self.inner.env);
        let (def_id, def) = select_one(matched).map_err(|e| {
            let mut path = frame.path_names();
            path.push(request.requested_name());
            match e {
                SelectError::NotFound => ContainerError::NoSuchBean {
                    requested: request.requested_name(),
                    qualifier: request.qualifier_name(),
                    path,
                },
                SelectError::Ambiguous(candidates) => ContainerError::AmbiguousBean {
                    requested: request.requested_name(),
                    candidates,
                    path,
                },
            }
        })?;

        let instance = self.instantiate(def_id, &def, frame, resolution)?;
        let instance = self.apply_exposure(&def, key, instance)?;
        Ok((def, instance))
    }

    /// 集合解析：每个匹配各自实例化
    fn resolve_request_all(
        &self,
        key: &TypeKey,
        qualifier: &Qualifier,
        frame: &mut ConstructionFrame,
        resolution: u64,
    ) -> Result<Vec<(Arc<BeanDefinition>, AnyInstance)>, ContainerError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(ContainerError::Closed);
        }
        self.inner.stats.resolutions.fetch_add(1, Ordering::Relaxed);

        let request = MatchRequest { key, qualifier };
        let matched = filter_candidates(&self.candidates_for(key.id()), &request, &self.inner.env);
        let mut out = Vec::new();
        for (def_id, def) in select_all(matched) {
            let instance = self.instantiate(def_id, &def, frame, resolution)?;
            let instance = self.apply_exposure(&def, key, instance)?;
            out.push((def, instance));
        }
        Ok(out)
    }

    fn apply_exposure(
        &self,
        def: &Arc<BeanDefinition>,
        key: &TypeKey,
        instance: AnyInstance,
    ) -> Result<AnyInstance, ContainerError> {
        if key.satisfied_by(def.type_key()) {
            return Ok(instance);
        }
        match def.exposure_for(key) {
            Some(exposure) => {
                (exposure.cast)(&instance).ok_or_else(|| ContainerError::TypeMismatch {
                    expected: key.display_name(),
                    context: format!(
                        "exposure cast of bean '{}' (intercepted beans are only resolvable via resolve_proxy)",
                        def.name()
                    ),
                })
            }
            None => Err(ContainerError::TypeMismatch {
                expected: key.display_name(),
                context: format!("bean '{}' advertises no matching exposure", def.name()),
            }),
        }
    }

    /// 按作用域实例化：入帧检循环，出帧回溯
    fn instantiate(
        &self,
        def_id: DefId,
        def: &Arc<BeanDefinition>,
        frame: &mut ConstructionFrame,
        resolution: u64,
    ) -> Result<AnyInstance, ContainerError> {
        frame.enter(def_id, def.name())?;
        let result = self.instantiate_scoped(def_id, def, frame, resolution);
        frame.exit();
        result
    }

    fn instantiate_scoped(
        &self,
        def_id: DefId,
        def: &Arc<BeanDefinition>,
        frame: &mut ConstructionFrame,
        resolution: u64,
    ) -> Result<AnyInstance, ContainerError> {
        match def.scope() {
            ScopeKind::Prototype => {
                self.inner
                    .stats
                    .prototype_constructions
                    .fetch_add(1, Ordering::Relaxed);
                self.construct(def, frame, resolution)
            }
            ScopeKind::Singleton => {
                let path = frame.path_names();
                match self
                    .inner
                    .singletons
                    .claim(def_id, resolution, def.name(), &path)?
                {
                    Claim::Ready(instance) => {
                        self.inner
                            .stats
                            .singleton_hits
                            .fetch_add(1, Ordering::Relaxed);
                        Ok(instance)
                    }
                    Claim::MustConstruct(permit) => {
                        self.inner
                            .stats
                            .singleton_misses
                            .fetch_add(1, Ordering::Relaxed);
                        let result = self.construct(def, frame, resolution);
                        // 成功则发布，失败则广播给所有等待方并清空槽位；
                        // 构造期间容器被关闭时双方一律收到 Closed
                        self.inner.singletons.complete(permit, result)
                    }
                }
            }
            ScopeKind::Custom(scope_name) => {
                let scope = self
                    .inner
                    .scopes
                    .get(scope_name)
                    .map(|entry| entry.clone())
                    .ok_or_else(|| ContainerError::ScopeNotRegistered {
                        scope: scope_name.clone(),
                        bean: def.name().to_string(),
                    })?;
                if let Some(instance) = scope.get(def.name()) {
                    return Ok(instance);
                }
                let instance = self.construct(def, frame, resolution)?;
                scope.put(def.name(), instance.clone());
                Ok(instance)
            }
        }
    }

    /// 执行一次完整构造：注入点 -> 工厂 -> 拦截链装配 -> post_construct
    fn construct(
        &self,
        def: &Arc<BeanDefinition>,
        frame: &mut ConstructionFrame,
        resolution: u64,
    ) -> Result<AnyInstance, ContainerError> {
        let mut resolved = Vec::with_capacity(def.injection_points.len());
        for (index, point) in def.injection_points.iter().enumerate() {
            let arg = match point.cardinality {
                Cardinality::One => {
                    let (_, instance) =
                        self.resolve_request(&point.target, &point.qualifier, frame, resolution)?;
                    ResolvedArg::One(instance)
                }
                Cardinality::Optional => {
                    match self.resolve_request(&point.target, &point.qualifier, frame, resolution)
                    {
                        Ok((_, instance)) => ResolvedArg::Optional(Some(instance)),
                        Err(e) if e.is_absence() => {
                            log::debug!(
                                "optional injection point #{index} of '{}' left empty",
                                def.name()
                            );
                            ResolvedArg::Optional(None)
                        }
                        Err(e) => return Err(e),
                    }
                }
                Cardinality::All => {
                    let matched = self.resolve_request_all(
                        &point.target,
                        &point.qualifier,
                        frame,
                        resolution,
                    )?;
                    ResolvedArg::All(matched.into_iter().map(|(_, i)| i).collect())
                }
                Cardinality::Deferred => ResolvedArg::Deferred {
                    target: point.target.clone(),
                    qualifier: point.qualifier.clone(),
                },
            };
            resolved.push(arg);
        }

        let args = FactoryArgs {
            resolved,
            env: &self.inner.env,
            container: self,
        };

        let raw = match &def.factory {
            FactoryStrategy::Constructor(factory) => {
                Some(factory(&args).map_err(|e| ContainerError::ConstructionFailed {
                    bean: def.name().to_string(),
                    reason: e.to_string(),
                })?)
            }
            FactoryStrategy::FactoryMethod {
                parent,
                parent_qualifier,
                method,
            } => {
                let (_, parent_instance) =
                    self.resolve_request(parent, parent_qualifier, frame, resolution)?;
                Some(method(&parent_instance, &args).map_err(|e| {
                    ContainerError::ConstructionFailed {
                        bean: def.name().to_string(),
                        reason: e.to_string(),
                    }
                })?)
            }
            FactoryStrategy::Introduction => None,
        };

        let instance = match &def.interception {
            Some(meta) => {
                let chains = self.build_chains(def, frame, resolution)?;
                (meta.proxy_factory)(raw, chains, def.name())?
            }
            None => raw.ok_or_else(|| ContainerError::ConstructionFailed {
                bean: def.name().to_string(),
                reason: "introduction strategy requires intercepted methods".to_string(),
            })?,
        };

        if let Some(hook) = &def.post_construct {
            hook(&instance).map_err(|e| ContainerError::ConstructionFailed {
                bean: def.name().to_string(),
                reason: format!("post-construct hook failed: {e}"),
            })?;
        }

        log::debug!("constructed bean '{}'", def.name());
        Ok(instance)
    }

    /// 装配方法拦截链：逐限定符解析拦截器 Bean，
    /// 按（拦截器定义优先级，声明顺序）排序。顺序稳定可复现。
    fn build_chains(
        &self,
        def: &Arc<BeanDefinition>,
        frame: &mut ConstructionFrame,
        resolution: u64,
    ) -> Result<Vec<MethodChain>, ContainerError> {
        let meta = match &def.interception {
            Some(meta) => meta,
            None => return Ok(Vec::new()),
        };
        let key = TypeKey::of::<dyn MethodInterceptor>();
        let mut chains = Vec::with_capacity(meta.methods.len());
        for binding in &meta.methods {
            let mut entries: Vec<(i32, usize, Arc<dyn MethodInterceptor>)> =
                Vec::with_capacity(binding.interceptors.len());
            for (declared_at, qualifier) in binding.interceptors.iter().enumerate() {
                let (interceptor_def, instance) =
                    self.resolve_request(&key, qualifier, frame, resolution)?;
                let interceptor = instance
                    .downcast::<Arc<dyn MethodInterceptor>>()
                    .map_err(|_| ContainerError::TypeMismatch {
                        expected: "dyn MethodInterceptor".to_string(),
                        context: format!(
                            "interceptor '{}' bound to method '{}' of '{}'",
                            interceptor_def.name(),
                            binding.name,
                            def.name()
                        ),
                    })?;
                entries.push((interceptor_def.priority(), declared_at, (*interceptor).clone()));
            }
            entries.sort_by_key(|entry| (entry.0, entry.1));
            chains.push(MethodChain::new(
                binding.name.clone(),
                entries.into_iter().map(|(_, _, i)| i).collect(),
            ));
        }
        Ok(chains)
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("definitions", &self.inner.definitions.len())
            .field("started", &self.is_started())
            .field("closed", &self.is_closed())
            .finish()
    }
}
