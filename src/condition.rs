//! 条件评估器
//!
//! Bean 定义的启用谓词：针对当前环境快照的可组合布尔表达式。
//! 评估是纯函数，无副作用；谓词引用的属性缺失时按“不满足”处理，
//! 而不是错误——单个定义的条件不满足不能中断其他候选的解析。

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::env::Environment;

/// 启用条件表达式
#[derive(Clone)]
pub enum Condition {
    /// 恒为满足（默认）
    Always,
    /// 属性存在且等于给定值
    PropertyEquals { name: String, value: Value },
    /// 属性存在（值任意）
    PropertyPresent(String),
    /// 属性缺失
    PropertyMissing(String),
    /// 取反
    Not(Box<Condition>),
    /// 全部满足
    AllOf(Vec<Condition>),
    /// 任一满足
    AnyOf(Vec<Condition>),
    /// 自定义谓词（必须保持纯函数）
    Custom(Arc<dyn Fn(&Environment) -> bool + Send + Sync>),
}

impl Condition {
    pub fn property_equals(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::PropertyEquals {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn property_present(name: impl Into<String>) -> Self {
        Condition::PropertyPresent(name.into())
    }

    pub fn property_missing(name: impl Into<String>) -> Self {
        Condition::PropertyMissing(name.into())
    }

    pub fn custom(f: impl Fn(&Environment) -> bool + Send + Sync + 'static) -> Self {
        Condition::Custom(Arc::new(f))
    }

    /// 针对环境快照评估条件
    pub fn matches(&self, env: &Environment) -> bool {
        match self {
            Condition::Always => true,
            Condition::PropertyEquals { name, value } => {
                // 属性缺失 => 不满足，而非错误
                env.raw(name).map(|v| v == value).unwrap_or(false)
            }
            Condition::PropertyPresent(name) => env.contains(name),
            Condition::PropertyMissing(name) => !env.contains(name),
            Condition::Not(inner) => !inner.matches(env),
            Condition::AllOf(inner) => inner.iter().all(|c| c.matches(env)),
            Condition::AnyOf(inner) => inner.iter().any(|c| c.matches(env)),
            Condition::Custom(f) => f(env),
        }
    }
}

impl Default for Condition {
    fn default() -> Self {
        Condition::Always
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Always => write!(f, "Always"),
            Condition::PropertyEquals { name, value } => {
                write!(f, "PropertyEquals({name} == {value})")
            }
            Condition::PropertyPresent(name) => write!(f, "PropertyPresent({name})"),
            Condition::PropertyMissing(name) => write!(f, "PropertyMissing({name})"),
            Condition::Not(inner) => write!(f, "Not({inner:?})"),
            Condition::AllOf(inner) => write!(f, "AllOf({inner:?})"),
            Condition::AnyOf(inner) => write!(f, "AnyOf({inner:?})"),
            Condition::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> Environment {
        Environment::empty()
            .with("cache.enabled", true)
            .with("profile", "prod")
    }

    #[test]
    fn property_equals() {
        assert!(Condition::property_equals("profile", "prod").matches(&env()));
        assert!(!Condition::property_equals("profile", "dev").matches(&env()));
    }

    #[test]
    fn missing_property_is_not_satisfied() {
        // 谓词无法评估（属性缺失）=> 不满足，而不是 panic 或错误
        assert!(!Condition::property_equals("no.such", "x").matches(&env()));
        assert!(Condition::property_missing("no.such").matches(&env()));
    }

    #[test]
    fn composition() {
        let c = Condition::AllOf(vec![
            Condition::property_present("cache.enabled"),
            Condition::Not(Box::new(Condition::property_equals("profile", "dev"))),
        ]);
        assert!(c.matches(&env()));

        let any = Condition::AnyOf(vec![
            Condition::property_equals("profile", "dev"),
            Condition::property_equals("profile", "prod"),
        ]);
        assert!(any.matches(&env()));
    }

    #[test]
    fn custom_predicate() {
        let c = Condition::custom(|env| env.len() >= 2);
        assert!(c.matches(&env()));
        assert!(!c.matches(&Environment::empty()));
    }
}
