use std::fmt;

use serde::{Deserialize, Serialize};
use weft_config::{EventKind, TriggerDef};

/// A concrete event that starts an orchestrator run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
  pub event: EventKind,
  pub branch: String,
}

impl Trigger {
  pub fn new(event: EventKind, branch: impl Into<String>) -> Self {
    Self {
      event,
      branch: branch.into(),
    }
  }

  /// Whether a trigger definition accepts this event.
  pub fn matches(&self, def: &TriggerDef) -> bool {
    if def.event != self.event {
      return false;
    }
    def.branches.is_empty()
      || def
        .branches
        .iter()
        .any(|pattern| branch_matches(pattern, &self.branch))
  }
}

impl fmt::Display for Trigger {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}@{}", self.event, self.branch)
  }
}

/// Match a branch name against a glob where `*` matches any run of characters.
pub fn branch_matches(pattern: &str, branch: &str) -> bool {
  let p: Vec<char> = pattern.chars().collect();
  let b: Vec<char> = branch.chars().collect();

  let (mut pi, mut bi) = (0usize, 0usize);
  // Position of the last `*` and the branch index it was tried at.
  let mut star: Option<(usize, usize)> = None;

  while bi < b.len() {
    if pi < p.len() && p[pi] == '*' {
      star = Some((pi, bi));
      pi += 1;
    } else if pi < p.len() && p[pi] == b[bi] {
      pi += 1;
      bi += 1;
    } else if let Some((sp, sb)) = star {
      pi = sp + 1;
      bi = sb + 1;
      star = Some((sp, sb + 1));
    } else {
      return false;
    }
  }

  p[pi..].iter().all(|c| *c == '*')
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_branch_matches() {
    assert!(branch_matches("main", "main"));
    assert!(!branch_matches("main", "maintenance"));
    assert!(branch_matches("release/*", "release/1.2"));
    assert!(!branch_matches("release/*", "hotfix/1.2"));
    assert!(branch_matches("*", "anything"));
    assert!(branch_matches("feature/*-wip", "feature/login-wip"));
    assert!(!branch_matches("feature/*-wip", "feature/login"));
  }

  #[test]
  fn test_trigger_matches() {
    let def = TriggerDef {
      event: EventKind::Push,
      branches: vec!["main".to_string()],
      jobs: vec![],
    };
    assert!(Trigger::new(EventKind::Push, "main").matches(&def));
    assert!(!Trigger::new(EventKind::Push, "dev").matches(&def));
    assert!(!Trigger::new(EventKind::PullRequest, "main").matches(&def));

    let any_branch = TriggerDef {
      event: EventKind::PullRequest,
      branches: vec![],
      jobs: vec![],
    };
    assert!(Trigger::new(EventKind::PullRequest, "feature/x").matches(&any_branch));
  }
}
