//! Dependency ordering for sibling items.
//!
//! Items declare the ids they depend on; `order` returns them so that every
//! item comes after its dependencies. Two sentinel tokens pin items to the
//! edges of the order: [`START`] moves an item ahead of all ordinary items and
//! [`END`] moves it behind them. Dependencies on ids that are not part of the
//! input are treated as already satisfied.

use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;

/// Sentinel dependency: place the item before all ordinary items.
pub const START: &str = "#start";
/// Sentinel dependency: place the item after all ordinary items.
pub const END: &str = "#end";

/// A circular `depends` graph. `chain` holds the ids on the walk that
/// revisited an in-progress node, ending with the revisited id.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("circular dependency detected: {}", chain.join(" -> "))]
pub struct CycleError {
    pub chain: Vec<String>,
}

/// Errors for ordering raw configuration objects.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("item #{index} has no string '{key}' field")]
    MissingId { index: usize, key: String },
    #[error(transparent)]
    Cycle(#[from] CycleError),
}

/// Anything that can be placed by the orderer.
pub trait Dependent {
    fn dependency_id(&self) -> &str;
    fn dependencies(&self) -> &[String];
}

/// Key names used by [`order_values`].
#[derive(Debug, Clone)]
pub struct OrderKeys {
    pub id: String,
    pub depends: String,
}

impl Default for OrderKeys {
    fn default() -> Self {
        Self {
            id: "id".to_string(),
            depends: "depends".to_string(),
        }
    }
}

/// Order typed items. Output preserves the original values, reordered.
pub fn order<T: Dependent>(items: Vec<T>) -> Result<Vec<T>, CycleError> {
    let plan = plan(
        items
            .iter()
            .map(|item| (item.dependency_id(), item.dependencies())),
    )?;
    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    Ok(plan.into_iter().filter_map(|i| slots[i].take()).collect())
}

/// Order raw JSON objects keyed by configurable id/depends field names.
/// `depends` may be a string, a list of strings, or absent.
pub fn order_values(items: Vec<Value>, keys: &OrderKeys) -> Result<Vec<Value>, OrderError> {
    let mut parsed = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let id = item
            .get(&keys.id)
            .and_then(Value::as_str)
            .ok_or_else(|| OrderError::MissingId {
                index,
                key: keys.id.clone(),
            })?
            .to_string();
        let depends = match item.get(&keys.depends) {
            Some(Value::String(one)) => vec![one.clone()],
            Some(Value::Array(many)) => many
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        };
        parsed.push((id, depends));
    }

    let plan = plan(parsed.iter().map(|(id, deps)| (id.as_str(), deps.as_slice())))?;
    let mut slots: Vec<Option<Value>> = items.into_iter().map(Some).collect();
    Ok(plan.into_iter().filter_map(|i| slots[i].take()).collect())
}

struct DependencyItem<'a> {
    id: &'a str,
    depends: &'a [String],
    index: isize,
    source: usize,
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Returns input positions in resolved order.
fn plan<'a, I>(entries: I) -> Result<Vec<usize>, CycleError>
where
    I: Iterator<Item = (&'a str, &'a [String])>,
{
    let mut items: Vec<DependencyItem<'a>> = entries
        .enumerate()
        .map(|(source, (id, depends))| DependencyItem {
            id,
            depends,
            index: source as isize,
            source,
        })
        .collect();

    let shift = items.len() as isize;
    for item in &mut items {
        if item.depends.iter().any(|d| d == START) {
            item.index -= shift;
        }
        if item.depends.iter().any(|d| d == END) {
            item.index += shift;
        }
    }
    // stable: equal indexes keep input order
    items.sort_by_key(|item| item.index);

    let by_id: HashMap<&str, usize> = items
        .iter()
        .enumerate()
        .map(|(pos, item)| (item.id, pos))
        .collect();

    let mut marks = vec![Mark::Unvisited; items.len()];
    let mut chain = Vec::new();
    let mut out = Vec::with_capacity(items.len());

    for pos in 0..items.len() {
        visit(pos, &items, &by_id, &mut marks, &mut chain, &mut out)?;
    }
    Ok(out)
}

fn visit<'a>(
    pos: usize,
    items: &[DependencyItem<'a>],
    by_id: &HashMap<&str, usize>,
    marks: &mut [Mark],
    chain: &mut Vec<&'a str>,
    out: &mut Vec<usize>,
) -> Result<(), CycleError> {
    let item = &items[pos];
    match marks[pos] {
        Mark::Done => return Ok(()),
        Mark::InProgress => {
            let mut ids: Vec<String> = chain.iter().map(|id| id.to_string()).collect();
            ids.push(item.id.to_string());
            return Err(CycleError { chain: ids });
        }
        Mark::Unvisited => {}
    }

    marks[pos] = Mark::InProgress;
    chain.push(item.id);
    for dep in item.depends {
        if let Some(&next) = by_id.get(dep.as_str()) {
            visit(next, items, by_id, marks, chain, out)?;
        }
    }
    chain.pop();
    marks[pos] = Mark::Done;
    out.push(item.source);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: String,
        depends: Vec<String>,
    }

    fn item(id: &str, deps: &[&str]) -> Item {
        Item {
            id: id.to_string(),
            depends: deps.iter().map(|d| d.to_string()).collect(),
        }
    }

    impl Dependent for Item {
        fn dependency_id(&self) -> &str {
            &self.id
        }
        fn dependencies(&self) -> &[String] {
            &self.depends
        }
    }

    fn ids(items: &[Item]) -> Vec<&str> {
        items.iter().map(|i| i.id.as_str()).collect()
    }

    #[test]
    fn start_sentinel_goes_first() {
        let out = order(vec![item("a", &[]), item("b", &["a"]), item("c", &["#start"])]).unwrap();
        assert_eq!(ids(&out), vec!["c", "a", "b"]);
    }

    #[test]
    fn empty_input_is_empty_output() {
        let out = order(Vec::<Item>::new()).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn dependency_pulls_item_forward() {
        let out = order(vec![item("cache", &["db"]), item("db", &[])]).unwrap();
        assert_eq!(ids(&out), vec!["db", "cache"]);
    }

    #[test]
    fn missing_dependency_is_ignored() {
        let out = order(vec![item("a", &["ghost"]), item("b", &[])]).unwrap();
        assert_eq!(ids(&out), vec!["a", "b"]);
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let err = order(vec![item("a", &["a"])]).unwrap_err();
        assert_eq!(err.chain, vec!["a", "a"]);
    }

    #[test]
    fn cycle_chain_names_every_member() {
        let err = order(vec![
            item("a", &["b"]),
            item("b", &["c"]),
            item("c", &["a"]),
            item("d", &[]),
        ])
        .unwrap_err();
        for id in ["a", "b", "c"] {
            assert!(err.chain.iter().any(|c| c == id), "{id} missing from {:?}", err.chain);
        }
        assert!(!err.chain.iter().any(|c| c == "d"));
        assert!(err.to_string().contains("a -> b -> c -> a"));
    }

    #[test]
    fn end_sentinels_keep_relative_order() {
        let out = order(vec![
            item("z1", &["#end"]),
            item("a", &[]),
            item("z2", &["#end"]),
            item("b", &[]),
        ])
        .unwrap();
        assert_eq!(ids(&out), vec!["a", "b", "z1", "z2"]);
    }

    #[test]
    fn order_values_uses_custom_keys() {
        let keys = OrderKeys {
            id: "name".into(),
            depends: "after".into(),
        };
        let out = order_values(
            vec![
                json!({"name": "web", "after": ["db", "cache"]}),
                json!({"name": "cache", "after": "db"}),
                json!({"name": "db"}),
            ],
            &keys,
        )
        .unwrap();
        let names: Vec<_> = out.iter().map(|v| v["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["db", "cache", "web"]);
    }

    #[test]
    fn order_values_rejects_missing_id() {
        let err = order_values(vec![json!({"depends": []})], &OrderKeys::default()).unwrap_err();
        assert!(matches!(err, OrderError::MissingId { index: 0, .. }));
    }
}
