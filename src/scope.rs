//! 作用域与单例注册表
//!
//! 单例缓存按“单飞”纪律运作：同一定义的并发首次解析只有一个线程
//! 执行工厂，其余线程阻塞等待同一个实例；失败时所有等待方收到同一
//! 错误的克隆。循环依赖有两道防线：同一次解析内的构造栈帧，以及
//! 跨线程的等待图——构造线程之间互相等待成环时报错而不是死锁。
//! 关闭注册表会立即以 `Closed` 释放所有在途构造的等待方，迟到的
//! 构造结果不再发布。自定义作用域只是命名的实例缓存，由调用方
//! 注册并触发销毁。

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::SystemTime;

use parking_lot::{Condvar, Mutex, RwLock};
use uuid::Uuid;

use crate::definition::AnyInstance;
use crate::error::ContainerError;

/// 定义的注册序号，同时充当注册顺序的平局裁决键
pub(crate) type DefId = u32;

/// 单次顶层解析的构造栈帧。
/// 入栈时检出重复定义即为同路径循环依赖。
pub(crate) struct ConstructionFrame {
    path: Vec<(DefId, String)>,
}

impl ConstructionFrame {
    pub(crate) fn new() -> Self {
        Self { path: Vec::new() }
    }

    pub(crate) fn enter(&mut self, id: DefId, name: &str) -> Result<(), ContainerError> {
        if let Some(pos) = self.path.iter().position(|(d, _)| *d == id) {
            let mut cycle: Vec<String> =
                self.path[pos..].iter().map(|(_, n)| n.clone()).collect();
            cycle.push(name.to_string());
            return Err(ContainerError::CircularDependency { cycle });
        }
        self.path.push((id, name.to_string()));
        Ok(())
    }

    pub(crate) fn exit(&mut self) {
        self.path.pop();
    }

    /// 当前依赖路径（用于错误信息）
    pub(crate) fn path_names(&self) -> Vec<String> {
        self.path.iter().map(|(_, n)| n.clone()).collect()
    }
}

/// 一次在途构造。done 写入后通过条件变量唤醒全部等待方。
struct InFlight {
    bean: String,
    owner_thread: ThreadId,
    owner_resolution: u64,
    done: Mutex<Option<Result<AnyInstance, ContainerError>>>,
    cv: Condvar,
}

impl InFlight {
    /// 写入结果并唤醒等待方；已有结果（例如关闭时抢先失败）则保留
    fn finish(&self, result: Result<AnyInstance, ContainerError>) {
        let mut done = self.done.lock();
        if done.is_none() {
            *done = Some(result);
        }
        self.cv.notify_all();
    }
}

enum Slot {
    Ready(AnyInstance),
    InFlight(Arc<InFlight>),
}

struct RegistryInner {
    slots: HashMap<DefId, Slot>,
    /// 等待图：阻塞中的解析 -> 它等待的定义
    waiting: HashMap<u64, DefId>,
    /// 完成顺序，销毁时逆序回放
    order: Vec<DefId>,
    closed: bool,
}

impl RegistryInner {
    /// 从 `start` 出发沿“等待的定义 -> 该定义的构造方 -> 构造方等待的
    /// 定义”走等待图；回到 `me` 即为跨线程循环。
    fn wait_cycle(&self, start: DefId, me: u64) -> Option<Vec<String>> {
        let mut names = Vec::new();
        let mut current = start;
        loop {
            let cell = match self.slots.get(&current) {
                Some(Slot::InFlight(cell)) => cell,
                _ => return None,
            };
            names.push(cell.bean.clone());
            if cell.owner_resolution == me {
                let mut cycle = Vec::with_capacity(names.len() + 1);
                if let Some(last) = names.last() {
                    cycle.push(last.clone());
                }
                cycle.extend(names.into_iter());
                return Some(cycle);
            }
            current = match self.waiting.get(&cell.owner_resolution) {
                Some(next) => *next,
                None => return None,
            };
        }
    }
}

/// 构造权凭证：胜出方持有它执行工厂，并凭它公布结果。
/// 结果经由凭证内的在途单元广播，不依赖槽位仍然存在——
/// 注册表在构造期间被关闭时，等待方依然会被唤醒。
pub(crate) struct ConstructionPermit {
    def_id: DefId,
    cell: Arc<InFlight>,
}

/// 认领结果：要么拿到已发布实例，要么由当前解析负责构造
pub(crate) enum Claim {
    Ready(AnyInstance),
    MustConstruct(ConstructionPermit),
}

impl std::fmt::Debug for Claim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Claim::Ready(_) => f.write_str("Claim::Ready(..)"),
            Claim::MustConstruct(_) => f.write_str("Claim::MustConstruct(..)"),
        }
    }
}

/// 单例注册表
pub(crate) struct SingletonRegistry {
    inner: Mutex<RegistryInner>,
}

impl SingletonRegistry {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                slots: HashMap::new(),
                waiting: HashMap::new(),
                order: Vec::new(),
                closed: false,
            }),
        }
    }

    /// 认领某定义的构造权。已发布则直接返回实例；在途则阻塞等待
    /// 胜出方的结果；空缺则登记在途构造并由调用方执行工厂。
    /// `path` 是当前解析的依赖路径，用于同线程重入的循环报告。
    pub(crate) fn claim(
        &self,
        def_id: DefId,
        resolution: u64,
        bean: &str,
        path: &[String],
    ) -> Result<Claim, ContainerError> {
        let current_thread = thread::current().id();
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(ContainerError::Closed);
        }
        let cell = match inner.slots.get(&def_id) {
            Some(Slot::Ready(instance)) => return Ok(Claim::Ready(instance.clone())),
            Some(Slot::InFlight(cell)) => cell.clone(),
            None => {
                let cell = Arc::new(InFlight {
                    bean: bean.to_string(),
                    owner_thread: current_thread,
                    owner_resolution: resolution,
                    done: Mutex::new(None),
                    cv: Condvar::new(),
                });
                inner.slots.insert(def_id, Slot::InFlight(cell.clone()));
                log::debug!("claimed construction of singleton '{bean}'");
                return Ok(Claim::MustConstruct(ConstructionPermit { def_id, cell }));
            }
        };

        // 构造方就是当前线程：等待必然死锁，按循环依赖报告完整路径
        if cell.owner_thread == current_thread {
            let mut cycle = Vec::with_capacity(path.len() + 1);
            cycle.push(cell.bean.clone());
            cycle.extend(path.iter().cloned());
            return Err(ContainerError::CircularDependency { cycle });
        }
        if let Some(cycle) = inner.wait_cycle(def_id, resolution) {
            return Err(ContainerError::CircularDependency { cycle });
        }

        inner.waiting.insert(resolution, def_id);
        drop(inner);
        log::debug!("waiting for in-flight construction of '{bean}'");
        let outcome = {
            let mut done = cell.done.lock();
            loop {
                if let Some(result) = done.as_ref() {
                    break result.clone();
                }
                cell.cv.wait(&mut done);
            }
        };
        let mut inner = self.inner.lock();
        inner.waiting.remove(&resolution);
        match outcome {
            Ok(instance) => Ok(Claim::Ready(instance)),
            // 失败广播给所有等待方；槽位已被清空，后续解析可重试
            Err(e) => Err(e),
        }
    }

    /// 公布构造结果并唤醒全部等待方，返回调用方应向上交付的结果。
    /// 成功：记录完成顺序；失败：清空槽位。注册表已关闭时结果
    /// 不再发布，胜出方与等待方一律收到 `Closed`。
    pub(crate) fn complete(
        &self,
        permit: ConstructionPermit,
        result: Result<AnyInstance, ContainerError>,
    ) -> Result<AnyInstance, ContainerError> {
        let mut inner = self.inner.lock();
        if inner.closed {
            drop(inner);
            permit.cell.finish(Err(ContainerError::Closed));
            return Err(ContainerError::Closed);
        }
        match &result {
            Ok(instance) => {
                inner
                    .slots
                    .insert(permit.def_id, Slot::Ready(instance.clone()));
                inner.order.push(permit.def_id);
            }
            Err(e) => {
                log::warn!("singleton '{}' construction failed: {e}", permit.cell.bean);
                inner.slots.remove(&permit.def_id);
            }
        }
        drop(inner);
        permit.cell.finish(result.clone());
        result
    }

    /// 已发布实例（不触发构造）
    pub(crate) fn peek(&self, def_id: DefId) -> Option<AnyInstance> {
        match self.inner.lock().slots.get(&def_id) {
            Some(Slot::Ready(instance)) => Some(instance.clone()),
            _ => None,
        }
    }

    pub(crate) fn ready_count(&self) -> usize {
        self.inner
            .lock()
            .slots
            .values()
            .filter(|s| matches!(s, Slot::Ready(_)))
            .count()
    }

    /// 关闭注册表并取出全部已发布实例，按完成顺序的逆序。
    /// 仍在途的构造立即以 `Closed` 释放其等待方，迟到的结果被丢弃。
    pub(crate) fn drain(&self) -> Vec<(DefId, AnyInstance)> {
        let mut inner = self.inner.lock();
        inner.closed = true;
        let order = std::mem::take(&mut inner.order);
        let mut out = Vec::with_capacity(order.len());
        for id in order.into_iter().rev() {
            if let Some(Slot::Ready(instance)) = inner.slots.remove(&id) {
                out.push((id, instance));
            }
        }
        for (_, slot) in inner.slots.drain() {
            if let Slot::InFlight(cell) = slot {
                log::debug!("failing in-flight construction of '{}' on close", cell.bean);
                cell.finish(Err(ContainerError::Closed));
            }
        }
        out
    }
}

/// 自定义作用域：命名的实例缓存。
/// 与单例不同，自定义作用域的读写不做单飞协调——缓存未命中时
/// 由当前解析构造并写回，并发未命中可能各自构造（后写覆盖先写）。
pub trait CustomScope: Send + Sync {
    fn name(&self) -> &str;
    fn get(&self, bean: &str) -> Option<AnyInstance>;
    fn put(&self, bean: &str, instance: AnyInstance);
    /// 取出全部实例（插入顺序），作用域随之清空
    fn drain(&self) -> Vec<(String, AnyInstance)>;
}

/// 作用域实例的描述信息
#[derive(Debug, Clone)]
pub struct ScopeInfo {
    pub id: Uuid,
    pub name: String,
    pub created_at: SystemTime,
}

struct MapScopeInner {
    instances: HashMap<String, AnyInstance>,
    order: Vec<String>,
}

/// 基于哈希表的通用作用域实现，适合请求级/会话级缓存
pub struct MapScope {
    info: ScopeInfo,
    inner: RwLock<MapScopeInner>,
}

impl MapScope {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            info: ScopeInfo {
                id: Uuid::new_v4(),
                name: name.clone(),
                created_at: SystemTime::now(),
            },
            inner: RwLock::new(MapScopeInner {
                instances: HashMap::new(),
                order: Vec::new(),
            }),
        }
    }

    pub fn info(&self) -> &ScopeInfo {
        &self.info
    }

    pub fn len(&self) -> usize {
        self.inner.read().instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().instances.is_empty()
    }
}

impl CustomScope for MapScope {
    fn name(&self) -> &str {
        &self.info.name
    }

    fn get(&self, bean: &str) -> Option<AnyInstance> {
        self.inner.read().instances.get(bean).cloned()
    }

    fn put(&self, bean: &str, instance: AnyInstance) {
        let mut inner = self.inner.write();
        if inner.instances.insert(bean.to_string(), instance).is_none() {
            inner.order.push(bean.to_string());
        }
    }

    fn drain(&self) -> Vec<(String, AnyInstance)> {
        let mut inner = self.inner.write();
        let order = std::mem::take(&mut inner.order);
        order
            .into_iter()
            .filter_map(|name| {
                inner
                    .instances
                    .remove(&name)
                    .map(|instance| (name, instance))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::time::Duration;

    fn instance_of(n: u64) -> AnyInstance {
        Arc::new(n) as AnyInstance
    }

    fn must_construct(claim: Claim) -> ConstructionPermit {
        match claim {
            Claim::MustConstruct(permit) => permit,
            Claim::Ready(_) => panic!("expected construction claim"),
        }
    }

    #[test]
    fn frame_detects_same_path_cycle() {
        let mut frame = ConstructionFrame::new();
        frame.enter(0, "a").unwrap();
        frame.enter(1, "b").unwrap();
        let err = frame.enter(0, "a").unwrap_err();
        match err {
            ContainerError::CircularDependency { cycle } => {
                assert_eq!(cycle, vec!["a", "b", "a"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn frame_exit_unwinds() {
        let mut frame = ConstructionFrame::new();
        frame.enter(0, "a").unwrap();
        frame.enter(1, "b").unwrap();
        frame.exit();
        // b 已出栈，可以再次进入
        frame.enter(1, "b").unwrap();
        assert_eq!(frame.path_names(), vec!["a", "b"]);
    }

    #[test]
    fn single_flight_constructs_once() {
        let registry = Arc::new(SingletonRegistry::new());
        let built = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8u64)
            .map(|resolution| {
                let registry = registry.clone();
                let built = built.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    match registry.claim(0, resolution, "db", &[]).unwrap() {
                        Claim::Ready(instance) => *instance.downcast_ref::<u64>().unwrap(),
                        Claim::MustConstruct(permit) => {
                            built.fetch_add(1, Ordering::SeqCst);
                            // 模拟慢构造，让其余线程真正进入等待
                            thread::sleep(Duration::from_millis(20));
                            registry.complete(permit, Ok(instance_of(42))).unwrap();
                            42
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 42);
        }
        assert_eq!(built.load(Ordering::SeqCst), 1);
        assert_eq!(registry.ready_count(), 1);
    }

    #[test]
    fn failure_is_broadcast_and_slot_cleared() {
        let registry = Arc::new(SingletonRegistry::new());
        let permit = must_construct(registry.claim(0, 0, "db", &[]).unwrap());

        let waiter = {
            let registry = registry.clone();
            thread::spawn(move || registry.claim(0, 1, "db", &[]))
        };
        thread::sleep(Duration::from_millis(20));
        let handed_out = registry.complete(
            permit,
            Err(ContainerError::ConstructionFailed {
                bean: "db".into(),
                reason: "boom".into(),
            }),
        );
        assert!(matches!(
            handed_out,
            Err(ContainerError::ConstructionFailed { .. })
        ));

        let err = waiter.join().unwrap().unwrap_err();
        assert!(matches!(err, ContainerError::ConstructionFailed { .. }));
        // 槽位已清空，后续解析可以重试
        assert!(matches!(
            registry.claim(0, 2, "db", &[]).unwrap(),
            Claim::MustConstruct(_)
        ));
    }

    #[test]
    fn same_thread_reentry_reports_resolution_path() {
        let registry = SingletonRegistry::new();
        let _permit = must_construct(registry.claim(0, 0, "a", &[]).unwrap());
        // 同一线程在另一次解析中再次认领同一定义，带着新解析的依赖路径
        let path = vec!["b".to_string(), "a".to_string()];
        let err = registry.claim(0, 1, "a", &path).unwrap_err();
        match err {
            ContainerError::CircularDependency { cycle } => {
                assert_eq!(cycle, vec!["a", "b", "a"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn cross_thread_wait_cycle_is_detected() {
        let registry = Arc::new(SingletonRegistry::new());
        // 线程甲构造 a 并等待 b；线程乙构造 b 并等待 a
        let permit_a = must_construct(registry.claim(0, 0, "a", &[]).unwrap());

        let other = {
            let registry = registry.clone();
            thread::spawn(move || {
                assert!(matches!(
                    registry.claim(1, 1, "b", &[]).unwrap(),
                    Claim::MustConstruct(_)
                ));
                // 乙等待 a，阻塞
                registry.claim(0, 1, "a", &[])
            })
        };
        thread::sleep(Duration::from_millis(30));

        // 甲等待 b：等待图成环，立即报错
        let err = registry.claim(1, 0, "b", &[]).unwrap_err();
        match &err {
            ContainerError::CircularDependency { cycle } => assert!(cycle.len() >= 2),
            other => panic!("unexpected error: {other}"),
        }

        // 解开乙：甲放弃构造 a
        let _ = registry.complete(
            permit_a,
            Err(ContainerError::ConstructionFailed {
                bean: "a".into(),
                reason: "cycle".into(),
            }),
        );
        assert!(other.join().unwrap().is_err());
    }

    #[test]
    fn drain_returns_reverse_completion_order() {
        let registry = SingletonRegistry::new();
        for (id, value) in [(0u32, 1u64), (1, 2), (2, 3)] {
            let permit = must_construct(registry.claim(id, 0, "x", &[]).unwrap());
            registry.complete(permit, Ok(instance_of(value))).unwrap();
        }
        let drained = registry.drain();
        let ids: Vec<DefId> = drained.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![2, 1, 0]);
        assert_eq!(registry.ready_count(), 0);
    }

    #[test]
    fn drain_releases_in_flight_waiters_and_rejects_late_results() {
        let registry = Arc::new(SingletonRegistry::new());
        let permit = must_construct(registry.claim(0, 0, "db", &[]).unwrap());

        let waiter = {
            let registry = registry.clone();
            thread::spawn(move || registry.claim(0, 1, "db", &[]))
        };
        thread::sleep(Duration::from_millis(20));

        // 关闭：在途槽位不可见于已发布集合，等待方立即收到 Closed
        let drained = registry.drain();
        assert!(drained.is_empty());
        let err = waiter.join().unwrap().unwrap_err();
        assert!(matches!(err, ContainerError::Closed));

        // 迟到的构造结果被丢弃，胜出方同样收到 Closed
        let handed_out = registry.complete(permit, Ok(instance_of(42)));
        assert!(matches!(handed_out, Err(ContainerError::Closed)));
        assert_eq!(registry.ready_count(), 0);

        // 关闭后的认领直接失败
        assert!(matches!(
            registry.claim(0, 2, "db", &[]),
            Err(ContainerError::Closed)
        ));
    }

    #[test]
    fn map_scope_caches_and_drains_in_insertion_order() {
        let scope = MapScope::new("request");
        assert_eq!(scope.name(), "request");
        assert!(scope.get("a").is_none());

        scope.put("a", instance_of(1));
        scope.put("b", instance_of(2));
        scope.put("a", instance_of(10)); // 覆盖不重复记序

        assert_eq!(scope.len(), 2);
        assert_eq!(*scope.get("a").unwrap().downcast_ref::<u64>().unwrap(), 10);

        let drained = scope.drain();
        let names: Vec<&str> = drained.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(scope.is_empty());
    }
}
