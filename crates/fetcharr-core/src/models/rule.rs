use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Read-only attributes of a title fetched from the metadata provider, used
/// for rule matching and series-type selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MediaAttributes {
    /// ISO 639-1 original-language code.
    pub original_language: String,
    pub genre_ids: Vec<i32>,
    pub keyword_ids: Vec<i32>,
    pub is_anime: bool,
}

/// A prioritizable filter bound to one backend-instance slot, carrying
/// replacement quality-profile / root-folder / tag values.
///
/// A rule matches when every populated condition matches. Priority is the
/// number of populated conditions; ties are broken by lowest rule id.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OverrideRule {
    pub id: i32,
    /// Backend instance this rule overrides defaults for.
    pub service_id: i32,
    pub languages: Option<Vec<String>>,
    pub genres: Option<Vec<i32>>,
    pub keywords: Option<Vec<i32>>,
    pub users: Option<Vec<Uuid>>,
    pub profile_id: Option<i32>,
    pub root_folder: Option<String>,
    pub tags: Option<Vec<i32>>,
}

impl OverrideRule {
    fn condition_count(&self) -> u32 {
        let populated = |b: bool| u32::from(b);
        populated(self.languages.as_ref().is_some_and(|v| !v.is_empty()))
            + populated(self.genres.as_ref().is_some_and(|v| !v.is_empty()))
            + populated(self.keywords.as_ref().is_some_and(|v| !v.is_empty()))
            + populated(self.users.as_ref().is_some_and(|v| !v.is_empty()))
    }

    pub fn matches(&self, user_id: Uuid, attrs: &MediaAttributes) -> bool {
        if let Some(languages) = self.languages.as_ref().filter(|v| !v.is_empty()) {
            if !languages.iter().any(|l| *l == attrs.original_language) {
                return false;
            }
        }
        if let Some(genres) = self.genres.as_ref().filter(|v| !v.is_empty()) {
            if !genres.iter().any(|g| attrs.genre_ids.contains(g)) {
                return false;
            }
        }
        if let Some(keywords) = self.keywords.as_ref().filter(|v| !v.is_empty()) {
            if !keywords.iter().any(|k| attrs.keyword_ids.contains(k)) {
                return false;
            }
        }
        if let Some(users) = self.users.as_ref().filter(|v| !v.is_empty()) {
            if !users.contains(&user_id) {
                return false;
            }
        }
        true
    }
}

/// Selects the highest-priority rule matching this user/title for the given
/// backend instance slot.
pub fn resolve_rule<'a>(
    rules: &'a [OverrideRule],
    service_id: i32,
    user_id: Uuid,
    attrs: &MediaAttributes,
) -> Option<&'a OverrideRule> {
    rules
        .iter()
        .filter(|r| r.service_id == service_id && r.matches(user_id, attrs))
        .max_by(|a, b| {
            a.condition_count()
                .cmp(&b.condition_count())
                .then(b.id.cmp(&a.id))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(language: &str, genres: &[i32], keywords: &[i32]) -> MediaAttributes {
        MediaAttributes {
            original_language: language.to_string(),
            genre_ids: genres.to_vec(),
            keyword_ids: keywords.to_vec(),
            is_anime: false,
        }
    }

    #[test]
    fn rule_with_no_conditions_matches_everything() {
        let rule = OverrideRule {
            id: 1,
            service_id: 1,
            ..Default::default()
        };
        assert!(rule.matches(Uuid::new_v4(), &attrs("en", &[], &[])));
    }

    #[test]
    fn all_populated_conditions_must_match() {
        let user = Uuid::new_v4();
        let rule = OverrideRule {
            id: 1,
            service_id: 1,
            languages: Some(vec!["ja".into()]),
            genres: Some(vec![16]),
            ..Default::default()
        };
        assert!(rule.matches(user, &attrs("ja", &[16, 35], &[])));
        assert!(!rule.matches(user, &attrs("ja", &[35], &[])));
        assert!(!rule.matches(user, &attrs("en", &[16], &[])));
    }

    #[test]
    fn most_specific_rule_wins() {
        let user = Uuid::new_v4();
        let rules = vec![
            OverrideRule {
                id: 1,
                service_id: 1,
                languages: Some(vec!["ja".into()]),
                profile_id: Some(10),
                ..Default::default()
            },
            OverrideRule {
                id: 2,
                service_id: 1,
                languages: Some(vec!["ja".into()]),
                genres: Some(vec![16]),
                profile_id: Some(20),
                ..Default::default()
            },
        ];
        let resolved = resolve_rule(&rules, 1, user, &attrs("ja", &[16], &[])).unwrap();
        assert_eq!(resolved.id, 2);
    }

    #[test]
    fn ties_break_to_lowest_id() {
        let user = Uuid::new_v4();
        let rules = vec![
            OverrideRule {
                id: 5,
                service_id: 1,
                languages: Some(vec!["ko".into()]),
                ..Default::default()
            },
            OverrideRule {
                id: 3,
                service_id: 1,
                genres: Some(vec![18]),
                ..Default::default()
            },
        ];
        let resolved = resolve_rule(&rules, 1, user, &attrs("ko", &[18], &[])).unwrap();
        assert_eq!(resolved.id, 3);
    }

    #[test]
    fn rules_for_other_instances_are_ignored() {
        let rules = vec![OverrideRule {
            id: 1,
            service_id: 7,
            ..Default::default()
        }];
        assert!(resolve_rule(&rules, 1, Uuid::new_v4(), &attrs("en", &[], &[])).is_none());
    }
}
