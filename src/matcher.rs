//! 限定符匹配器
//!
//! 把一个依赖请求（目标类型 + 可选限定符 + 泛型参数）映射到零个、
//! 一个或多个候选定义。纯函数：相同的（请求、已注册定义、环境）
//! 输入永远产生相同输出，与并发解析活动无关。平局裁决：
//! 唯一 primary 胜出；否则唯一严格最小优先级胜出；再否则按
//! 单值/集合语义分别报歧义或全量返回。

use std::sync::Arc;

use crate::definition::{BeanDefinition, Qualifier, TypeKey};
use crate::env::Environment;
use crate::scope::DefId;

/// 一个已注册定义及其注册序号（序号由元数据生产者的确定顺序决定）
pub(crate) type Candidate = (DefId, Arc<BeanDefinition>);

/// 一次依赖请求
pub(crate) struct MatchRequest<'a> {
    pub key: &'a TypeKey,
    pub qualifier: &'a Qualifier,
}

impl MatchRequest<'_> {
    pub(crate) fn requested_name(&self) -> String {
        self.key.display_name()
    }

    pub(crate) fn qualifier_name(&self) -> Option<String> {
        self.qualifier.describe()
    }
}

/// 第一阶段：条件过滤 + 类型可赋性 + 限定符相符。
/// 条件不满足的定义在匹配前排除，且不产生任何错误。
pub(crate) fn filter_candidates(
    definitions: &[Candidate],
    request: &MatchRequest<'_>,
    env: &Environment,
) -> Vec<Candidate> {
    definitions
        .iter()
        .filter(|(_, def)| {
            def.condition.matches(env)
                && def.matches_key(request.key)
                && def.satisfies_qualifier(request.qualifier)
        })
        .cloned()
        .collect()
}

/// 单值选择的失败形态；由容器补全依赖路径后再对外呈现
pub(crate) enum SelectError {
    NotFound,
    Ambiguous(Vec<String>),
}

/// 单值请求的裁决
pub(crate) fn select_one(mut candidates: Vec<Candidate>) -> Result<Candidate, SelectError> {
    match candidates.len() {
        0 => Err(SelectError::NotFound),
        1 => Ok(candidates.remove(0)),
        _ => {
            let primaries: Vec<usize> = candidates
                .iter()
                .enumerate()
                .filter(|(_, (_, def))| def.is_primary())
                .map(|(i, _)| i)
                .collect();
            if primaries.len() == 1 {
                return Ok(candidates.swap_remove(primaries[0]));
            }
            if primaries.is_empty() {
                // 非 primary 候选之间：唯一的严格最小优先级胜出，平局即歧义
                if let Some(min) = candidates.iter().map(|(_, def)| def.priority()).min() {
                    let best: Vec<usize> = candidates
                        .iter()
                        .enumerate()
                        .filter(|(_, (_, def))| def.priority() == min)
                        .map(|(i, _)| i)
                        .collect();
                    if best.len() == 1 {
                        return Ok(candidates.swap_remove(best[0]));
                    }
                }
            }
            Err(SelectError::Ambiguous(
                candidates
                    .iter()
                    .map(|(_, def)| def.name().to_string())
                    .collect(),
            ))
        }
    }
}

/// 集合请求：全部匹配，优先级升序，平局按注册顺序
pub(crate) fn select_all(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates.sort_by_key(|(id, def)| (def.priority(), *id));
    candidates
}
