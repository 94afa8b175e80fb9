use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassInfo {
    pub id: String,
    pub name: String,
    pub section: String,
}

/// Class membership lookup, owned by the user/class collaborator.
pub trait Roster {
    fn students_in_class(&self, class_id: &str) -> anyhow::Result<Vec<String>>;
    fn classes(&self) -> anyhow::Result<Vec<ClassInfo>>;

    /// Every class paired with its students, in `classes()` order.
    fn classes_with_students(&self) -> anyhow::Result<Vec<(ClassInfo, Vec<String>)>> {
        self.classes()?
            .into_iter()
            .map(|c| {
                let students = self.students_in_class(&c.id)?;
                Ok((c, students))
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticRoster {
    classes: BTreeMap<String, (ClassInfo, Vec<String>)>,
}

impl StaticRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_class(mut self, info: ClassInfo, students: Vec<String>) -> Self {
        self.set_class(info, students);
        self
    }

    pub fn set_class(&mut self, info: ClassInfo, students: Vec<String>) {
        self.classes.insert(info.id.clone(), (info, students));
    }
}

impl Roster for StaticRoster {
    fn students_in_class(&self, class_id: &str) -> anyhow::Result<Vec<String>> {
        Ok(self
            .classes
            .get(class_id)
            .map(|(_, s)| s.clone())
            .unwrap_or_default())
    }

    fn classes(&self) -> anyhow::Result<Vec<ClassInfo>> {
        Ok(self.classes.values().map(|(c, _)| c.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_roster_lists_classes_in_id_order() {
        let roster = StaticRoster::new()
            .with_class(
                ClassInfo {
                    id: "10-B".to_string(),
                    name: "10".to_string(),
                    section: "B".to_string(),
                },
                vec!["S4".to_string()],
            )
            .with_class(
                ClassInfo {
                    id: "10-A".to_string(),
                    name: "10".to_string(),
                    section: "A".to_string(),
                },
                vec!["S1".to_string(), "S2".to_string()],
            );
        let all = roster.classes_with_students().expect("classes");
        assert_eq!(all[0].0.id, "10-A");
        assert_eq!(all[0].1.len(), 2);
        assert!(roster.students_in_class("11-C").expect("lookup").is_empty());
    }
}
