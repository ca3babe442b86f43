//! repository-configuration deduplication
//!
//! computes the coarsest equivalence of repositories that behave
//! identically (bisimilarity over roots, overrides and bindings up to the
//! relation itself), merges each class onto one representative and
//! rewrites every reference. operates on the raw JSON configuration:
//! repository descriptions are open-world and unknown root types compare
//! structurally.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// the `repositories` object of a configuration
pub type Repos = Map<String, Value>;

#[derive(Default)]
struct PairState {
    different: bool,
    /// pairs that become different when this one does
    watchers: Vec<(String, String)>,
}

struct Bisim<'a> {
    repos: &'a Repos,
    pairs: HashMap<(String, String), PairState>,
}

fn ordered(a: &str, b: &str) -> (String, String) {
    if a < b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

fn subdir(root: &Value) -> Value {
    root.get("subdir")
        .cloned()
        .unwrap_or_else(|| Value::String(".".to_string()))
}

fn config_of(root: &Value) -> Value {
    root.get("config")
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new()))
}

fn bindings<'a>(repos: &'a Repos, name: &str) -> Option<&'a Map<String, Value>> {
    repos
        .get(name)
        .and_then(|entry| entry.get("bindings"))
        .and_then(Value::as_object)
}

/// follow `repository` string indirections to a proper root value
fn follow_root_reference<'a>(repos: &'a Repos, start: &str) -> Result<&'a Value> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut name = start.to_string();
    loop {
        if !seen.insert(name.clone()) {
            return Err(Error::RootCycle(name));
        }
        let entry = repos
            .get(&name)
            .ok_or_else(|| Error::UnknownRepository(name.clone()))?;
        match entry.get("repository") {
            Some(Value::String(next)) => name = next.clone(),
            Some(root) if !root.is_null() => return Ok(root),
            _ => return Err(Error::MissingRoot(name)),
        }
    }
}

/// resolve one of a repository's roots, falling back to `default`
///
/// the alternate roots (`target_root`, ...) default to the previously
/// resolved root, so the chain cascades the way consumers see it.
fn resolve_root<'a>(
    repos: &'a Repos,
    name: &str,
    root_name: &str,
    default: Option<&'a Value>,
) -> Result<&'a Value> {
    let entry = repos
        .get(name)
        .ok_or_else(|| Error::UnknownRepository(name.to_string()))?;
    match entry.get(root_name) {
        Some(Value::String(target)) => follow_root_reference(repos, target),
        Some(root) if !root.is_null() => Ok(root),
        _ => default.ok_or_else(|| Error::MissingRoot(name.to_string())),
    }
}

impl Bisim<'_> {
    fn is_different(&self, a: &str, b: &str) -> bool {
        self.pairs
            .get(&ordered(a, b))
            .is_some_and(|pair| pair.different)
    }

    fn mark_as_different(&mut self, a: &str, b: &str) {
        let mut stack = vec![ordered(a, b)];
        while let Some(key) = stack.pop() {
            let pair = self.pairs.entry(key).or_default();
            if pair.different {
                continue;
            }
            pair.different = true;
            for (x, y) in std::mem::take(&mut pair.watchers) {
                stack.push(ordered(&x, &y));
            }
        }
    }

    fn register_dependency(&mut self, a: &str, b: &str, dep_a: &str, dep_b: &str) {
        self.pairs
            .entry(ordered(a, b))
            .or_default()
            .watchers
            .push((dep_a.to_string(), dep_b.to_string()));
    }

    fn roots_equal(&mut self, a: &Value, b: &Value, name_a: &str, name_b: &str) -> bool {
        if a.get("type") != b.get("type") {
            return false;
        }
        match a.get("type").and_then(Value::as_str) {
            Some("file") => a.get("path") == b.get("path"),
            Some("archive") | Some("zip") => {
                a.get("content") == b.get("content") && subdir(a) == subdir(b)
            }
            Some("git") => a.get("commit") == b.get("commit") && subdir(a) == subdir(b),
            Some(kind @ ("computed" | "tree structure")) => {
                if kind == "computed"
                    && (config_of(a) != config_of(b) || a.get("target") != b.get("target"))
                {
                    return false;
                }
                match (
                    a.get("repo").and_then(Value::as_str),
                    b.get("repo").and_then(Value::as_str),
                ) {
                    (Some(repo_a), Some(repo_b)) => {
                        if repo_a == repo_b {
                            true
                        } else if self.is_different(repo_a, repo_b) {
                            false
                        } else {
                            // equality pending target repo equality
                            self.register_dependency(repo_a, repo_b, name_a, name_b);
                            true
                        }
                    }
                    _ => a.get("repo") == b.get("repo"),
                }
            }
            // unknown repository type: only full equality is safe
            _ => a == b,
        }
    }

    fn repo_roots_equal(&mut self, name_a: &str, name_b: &str) -> Result<bool> {
        if name_a == name_b {
            return Ok(true);
        }
        let repos = self.repos;
        let mut root_a: Option<&Value> = None;
        let mut root_b: Option<&Value> = None;
        for root_name in ["repository", "target_root", "rule_root", "expression_root"] {
            let resolved_a = resolve_root(repos, name_a, root_name, root_a)?;
            let resolved_b = resolve_root(repos, name_b, root_name, root_b)?;
            if !self.roots_equal(resolved_a, resolved_b, name_a, name_b) {
                return Ok(false);
            }
            root_a = Some(resolved_a);
            root_b = Some(resolved_b);
        }
        for (file_name, default_name) in [
            ("target_file_name", "TARGETS"),
            ("rule_file_name", "RULES"),
            ("expression_file_name", "EXPRESSIONS"),
        ] {
            let fname = |name: &str| -> Value {
                repos
                    .get(name)
                    .and_then(|entry| entry.get(file_name))
                    .cloned()
                    .unwrap_or_else(|| Value::String(default_name.to_string()))
            };
            if fname(name_a) != fname(name_b) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// compute the maximal bisimulation and return the bisimilarity classes
pub fn bisimilar_repos(repos: &Repos) -> Result<Vec<Vec<String>>> {
    let mut names: Vec<String> = repos.keys().cloned().collect();
    names.sort();
    let mut bisim = Bisim {
        repos,
        pairs: HashMap::new(),
    };
    for j in 0..names.len() {
        let b = names[j].clone();
        for i in 0..j {
            let a = names[i].clone();
            if bisim.is_different(&a, &b) {
                continue;
            }
            if !bisim.repo_roots_equal(&a, &b)? {
                bisim.mark_as_different(&a, &b);
                continue;
            }
            let links_a = bindings(repos, &a);
            let links_b = bindings(repos, &b);
            let keys_a: BTreeSet<&String> = links_a.map(|m| m.keys().collect()).unwrap_or_default();
            let keys_b: BTreeSet<&String> = links_b.map(|m| m.keys().collect()).unwrap_or_default();
            if keys_a != keys_b {
                bisim.mark_as_different(&a, &b);
                continue;
            }
            if let (Some(links_a), Some(links_b)) = (links_a, links_b) {
                for (link, next_a) in links_a {
                    let Some(next_b) = links_b.get(link) else {
                        continue;
                    };
                    if next_a == next_b {
                        continue;
                    }
                    match (next_a.as_str(), next_b.as_str()) {
                        (Some(next_a), Some(next_b)) => {
                            if bisim.is_different(next_a, next_b) {
                                bisim.mark_as_different(&a, &b);
                                break;
                            }
                            // equality pending binding equality
                            bisim.register_dependency(next_a, next_b, &a, &b);
                        }
                        _ => {
                            bisim.mark_as_different(&a, &b);
                            break;
                        }
                    }
                }
            }
        }
    }

    // the complement of `different` at fixed point is the bisimulation
    let mut classes: Vec<Vec<String>> = Vec::new();
    let mut done: HashSet<String> = HashSet::new();
    for j in (0..names.len()).rev() {
        if done.contains(&names[j]) {
            continue;
        }
        let mut class = vec![names[j].clone()];
        for i in 0..j {
            if !bisim.is_different(&names[i], &names[j]) {
                class.push(names[i].clone());
                done.insert(names[i].clone());
            }
        }
        classes.push(class);
    }
    Ok(classes)
}

/// pick the main representative out of a bisimilarity class
///
/// prefers repositories with a proper root over string indirections, then
/// members of the keep set, then the name with the fewest path separators,
/// shortest length, lexicographically smallest.
fn choose_representative(class: &[String], repos: &Repos, keep: &BTreeSet<String>) -> Option<String> {
    let with_root: Vec<&String> = class
        .iter()
        .filter(|name| {
            repos
                .get(name.as_str())
                .and_then(|entry| entry.get("repository"))
                .is_some_and(Value::is_object)
        })
        .collect();
    let candidates: Vec<&String> = if with_root.is_empty() {
        class.iter().collect()
    } else {
        with_root
    };
    let kept: Vec<&String> = candidates
        .iter()
        .copied()
        .filter(|name| keep.contains(*name))
        .collect();
    let pool = if kept.is_empty() { candidates } else { kept };
    pool.into_iter()
        .min_by_key(|name| (name.matches('/').count(), name.len(), (*name).clone()))
        .cloned()
}

/// recompute the representative's pragma from the whole class
///
/// `absent` survives only when every merged repo with a proper root has
/// it; `to_git` spreads when at least one requires it.
fn merge_pragma(rep: &str, merged: &[String], repos: &Repos) -> Value {
    let desc = repos
        .get(rep)
        .and_then(|entry| entry.get("repository"))
        .cloned()
        .unwrap_or(Value::Null);
    let mut desc = match desc {
        Value::Object(obj) => obj,
        other => return other,
    };
    let mut pragma = desc
        .get("pragma")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    // members whose description is a string indirection do not contribute
    let member_flag = |name: &String, key: &str| -> Option<bool> {
        repos
            .get(name.as_str())
            .and_then(|entry| entry.get("repository"))
            .and_then(Value::as_object)
            .map(|root| {
                root.get("pragma")
                    .and_then(|pragma| pragma.get(key))
                    .and_then(Value::as_bool)
                    .unwrap_or(false)
            })
    };

    let mut absent = pragma
        .get("absent")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    for name in merged {
        if let Some(flag) = member_flag(name, "absent") {
            absent = absent && flag;
        }
    }
    if absent {
        pragma.insert("absent".to_string(), Value::Bool(true));
    } else {
        pragma.remove("absent");
    }

    let mut to_git = pragma
        .get("to_git")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    for name in merged {
        if let Some(flag) = member_flag(name, "to_git") {
            to_git = to_git || flag;
        }
    }
    if to_git {
        pragma.insert("to_git".to_string(), Value::Bool(true));
    } else {
        pragma.remove("to_git");
    }

    if pragma.is_empty() {
        desc.remove("pragma");
    } else {
        desc.insert("pragma".to_string(), Value::Object(pragma));
    }
    Value::Object(desc)
}

/// name usable as a root reference in the final configuration
fn final_root_reference(
    repos: &Repos,
    renaming: &HashMap<String, String>,
    start: &str,
) -> Result<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut name = start.to_string();
    loop {
        if !seen.insert(name.clone()) {
            return Err(Error::RootCycle(name));
        }
        let root = repos.get(&name).and_then(|entry| entry.get("repository"));
        match root {
            Some(Value::Object(_)) => {
                // proper root; may have been merged, but only into another proper root
                return Ok(renaming.get(&name).cloned().unwrap_or(name));
            }
            Some(Value::String(next)) => name = next.clone(),
            _ => {
                return Err(Error::InvalidRoot {
                    name: name.clone(),
                    root: root.cloned().unwrap_or(Value::Null).to_string(),
                })
            }
        }
    }
}

/// deduplicate bisimilar repositories, preserving every name in `keep`
///
/// the configured `main` repository is always preserved. every binding,
/// string root reference and precomputed-root target naming a merged
/// repository is rewritten to its class representative; all other
/// top-level configuration keys pass through unchanged.
pub fn dedup(config: &Value, user_keep: &[String]) -> Result<Value> {
    let repos = match config.get("repositories").and_then(Value::as_object) {
        Some(repos) => repos.clone(),
        None => return Ok(config.clone()),
    };
    let mut keep: BTreeSet<String> = user_keep.iter().cloned().collect();
    if let Some(main) = config.get("main").and_then(Value::as_str) {
        keep.insert(main.to_string());
    }

    let classes = bisimilar_repos(&repos)?;
    let mut renaming: HashMap<String, String> = HashMap::new();
    let mut updated_repos: HashMap<String, Value> = HashMap::new();
    for class in &classes {
        if class.len() == 1 {
            continue;
        }
        let Some(rep) = choose_representative(class, &repos, &keep) else {
            continue;
        };
        updated_repos.insert(rep.clone(), merge_pragma(&rep, class, &repos));
        for name in class {
            if !keep.contains(name) && *name != rep {
                renaming.insert(name.clone(), rep.clone());
            }
        }
    }

    let mut new_repos = Map::new();
    for (name, desc) in &repos {
        if renaming.contains_key(name) {
            continue;
        }
        let mut desc = desc.clone();
        if let Some(obj) = desc.as_object_mut() {
            if let Some(updated) = updated_repos.get(name) {
                obj.insert("repository".to_string(), updated.clone());
            }
            if let Some(bound_repos) = obj.get_mut("bindings").and_then(Value::as_object_mut) {
                for bound in bound_repos.values_mut() {
                    if let Some(rep) = bound.as_str().and_then(|target| renaming.get(target)) {
                        *bound = Value::String(rep.clone());
                    }
                }
            }
            for root in ["repository", "target_root", "rule_root", "expression_root"] {
                let target = obj.get(root).and_then(Value::as_str).map(str::to_string);
                if let Some(target) = target {
                    if renaming.contains_key(&target) {
                        let reference = final_root_reference(&repos, &renaming, &target)?;
                        obj.insert(root.to_string(), Value::String(reference));
                    }
                }
            }
            // target repos of precomputed roots
            if let Some(repo_root) = obj.get_mut("repository").and_then(Value::as_object_mut) {
                let precomputed = matches!(
                    repo_root.get("type").and_then(Value::as_str),
                    Some("computed") | Some("tree structure")
                );
                if precomputed {
                    let renamed = repo_root
                        .get("repo")
                        .and_then(Value::as_str)
                        .and_then(|target| renaming.get(target))
                        .cloned();
                    if let Some(rep) = renamed {
                        repo_root.insert("repo".to_string(), Value::String(rep));
                    }
                }
            }
        }
        new_repos.insert(name.clone(), desc);
    }

    let mut out = config.as_object().cloned().unwrap_or_default();
    out.insert("repositories".to_string(), Value::Object(new_repos));
    Ok(Value::Object(out))
}
