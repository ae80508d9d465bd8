//! 容器错误处理模块
//!
//! 提供统一的错误类型和可诊断的错误信息。
//! 所有变体仅携带自有数据（String/Vec），因此错误可以 Clone ——
//! 单飞构造失败时，同一错误需要分发给所有阻塞在该构造上的调用方。

use thiserror::Error;

/// 容器统一错误类型
#[derive(Debug, Clone, Error)]
pub enum ContainerError {
    /// 没有候选 Bean 满足请求
    #[error("no bean found for '{requested}'{} (path: {})", fmt_qualifier(.qualifier), .path.join(" -> "))]
    NoSuchBean {
        requested: String,
        qualifier: Option<String>,
        path: Vec<String>,
    },

    /// 单值请求命中多个未分级的候选
    #[error("ambiguous bean request for '{requested}': {} candidates [{}] (path: {})", .candidates.len(), .candidates.join(", "), .path.join(" -> "))]
    AmbiguousBean {
        requested: String,
        candidates: Vec<String>,
        path: Vec<String>,
    },

    /// 构造路径上检测到循环依赖
    #[error("circular dependency detected: {}", .cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },

    /// 工厂或生命周期回调执行失败
    #[error("failed to construct bean '{bean}': {reason}")]
    ConstructionFailed { bean: String, reason: String },

    /// Introduction Bean 的拦截链没有产生任何结果
    #[error("introduction bean '{bean}' produced no result for method '{method}'")]
    UnimplementedIntroduction { bean: String, method: String },

    /// 代理对象上不存在被请求的方法
    #[error("bean '{bean}' has no intercepted method '{method}'")]
    NoSuchMethod { bean: String, method: String },

    /// 被拦截方法的终端方法体执行失败
    #[error("invocation of '{method}' on bean '{bean}' failed: {reason}")]
    InvocationFailed {
        bean: String,
        method: String,
        reason: String,
    },

    /// 内部类型转换失败（注册与请求的类型不一致）
    #[error("type mismatch: expected '{expected}' in {context}")]
    TypeMismatch { expected: String, context: String },

    /// 自定义作用域未注册
    #[error("bean '{bean}' declares unregistered scope '{scope}'")]
    ScopeNotRegistered { scope: String, bean: String },

    /// 事件监听器执行失败
    #[error("event listener '{bean}' failed: {reason}")]
    ListenerFailed { bean: String, reason: String },

    /// 容器已关闭
    #[error("container is closed")]
    Closed,
}

fn fmt_qualifier(qualifier: &Option<String>) -> String {
    match qualifier {
        Some(q) => format!(" qualified by {q}"),
        None => String::new(),
    }
}

impl ContainerError {
    /// 判断错误是否表示“候选缺失”，可被可选注入点吸收为 None
    pub fn is_absence(&self) -> bool {
        matches!(self, ContainerError::NoSuchBean { .. })
    }
}
