//! Keyword-based question classifier.
//!
//! Lower-cases the question and checks it for substrings from fixed keyword
//! lists. Categories compose with OR semantics, so one question can raise
//! several flags. Location resolution walks an ordered alias list and stops
//! at the first hit; ties go to list order, not position in the question.

use crate::config::{ClassifierConfig, LocationAlias};
use crate::models::QuestionIntent;

/// All keyword lists and the ordered location table.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordTable {
    pub weather: Vec<String>,
    pub tide: Vec<String>,
    /// Fishing-activity terms; a hit implies both weather and tide.
    pub fishing: Vec<String>,
    pub statistics: Vec<String>,
    pub species: Vec<String>,
    pub regulations: Vec<String>,
    pub platform: Vec<String>,
    pub comparison: Vec<String>,
    pub locations: Vec<LocationAlias>,
    pub default_location: String,
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for KeywordTable {
    fn default() -> Self {
        Self {
            weather: words(&[
                "météo", "meteo", "temps", "vent", "pluie", "température", "temperature",
                "chaleur", "climat", "houle", "vague", "orage", "nuage", "humidité", "humidite",
                "prévision", "prevision", "tempête", "tempete", "brouillard",
            ]),
            tide: words(&[
                "marée", "maree", "haute mer", "basse mer", "coefficient", "montante",
                "descendante", "étale", "etale", "courant",
            ]),
            fishing: words(&[
                "pêcher", "pecher", "sortir en mer", "sortie en mer", "aller en mer",
                "partir en mer", "prendre la mer", "meilleur moment", "moment idéal",
                "moment ideal", "heure de pêche", "heure de peche",
            ]),
            statistics: words(&[
                "statistique", "stats", "chiffre", "évolution", "evolution", "capture",
                "débarquement", "debarquement", "production", "tonnage", "volume", "prix",
                "revenu", "combien", "tendance",
            ]),
            species: words(&[
                "espèce", "espece", "poisson", "thiof", "sardinelle", "yaboye", "mérou", "merou",
                "thon", "poulpe", "crevette", "dorade", "capitaine", "langouste", "seiche",
                "sole", "maquereau",
            ]),
            regulations: words(&[
                "réglementation", "reglementation", "règlement", "reglement", "loi", "interdit",
                "interdiction", "autorisé", "autorise", "permis", "licence", "quota",
                "code de la pêche", "code de la peche", "repos biologique", "maillage",
                "taille minimale", "sanction", "amende",
            ]),
            platform: words(&[
                "sunupechenet", "plateforme", "application", "fonctionnalité", "fonctionnalite",
                "comment utiliser", "qui es-tu", "qui es tu", "aide-moi à utiliser",
            ]),
            comparison: words(&[
                "compar", "meilleur", "meilleure", "versus", " vs ", "différence", "difference",
                "plutôt", "plutot",
            ]),
            locations: vec![
                alias("dakar", "Dakar"),
                alias("saint-louis", "Saint-Louis"),
                alias("saint louis", "Saint-Louis"),
                alias("thiès", "Thiès"),
                alias("thies", "Thiès"),
                alias("mbour", "Mbour"),
                alias("joal", "Joal-Fadiouth"),
                alias("ziguinchor", "Ziguinchor"),
                alias("kayar", "Kayar"),
                alias("kaolack", "Kaolack"),
            ],
            default_location: "Dakar".to_string(),
        }
    }
}

fn alias(keyword: &str, name: &str) -> LocationAlias {
    LocationAlias {
        keyword: keyword.to_string(),
        name: name.to_string(),
    }
}

impl KeywordTable {
    /// Built-in vocabulary with any lists set in `[classifier]` replacing it.
    pub fn from_config(config: &ClassifierConfig) -> Self {
        let mut table = Self::default();
        let overrides: [(&Option<Vec<String>>, &mut Vec<String>); 8] = [
            (&config.weather, &mut table.weather),
            (&config.tide, &mut table.tide),
            (&config.fishing, &mut table.fishing),
            (&config.statistics, &mut table.statistics),
            (&config.species, &mut table.species),
            (&config.regulations, &mut table.regulations),
            (&config.platform, &mut table.platform),
            (&config.comparison, &mut table.comparison),
        ];
        for (source, target) in overrides {
            if let Some(list) = source {
                *target = list.iter().map(|k| k.to_lowercase()).collect();
            }
        }
        if let Some(locations) = &config.locations {
            table.locations = locations
                .iter()
                .map(|a| alias(&a.keyword.to_lowercase(), &a.name))
                .collect();
        }
        table.default_location = config.default_location.clone();
        table
    }
}

/// Turns questions into [`QuestionIntent`]s.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    table: KeywordTable,
}

impl Classifier {
    pub fn new(table: KeywordTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &KeywordTable {
        &self.table
    }

    pub fn classify(&self, question: &str) -> QuestionIntent {
        let q = question.to_lowercase();
        let t = &self.table;
        let mut intent = QuestionIntent::at(self.resolve_location(&q));

        if any_hit(&q, &t.weather) {
            intent.needs_weather = true;
        }
        if any_hit(&q, &t.tide) {
            intent.needs_tide = true;
        }
        if any_hit(&q, &t.fishing) {
            intent.needs_weather = true;
            intent.needs_tide = true;
        }
        if any_hit(&q, &t.statistics) {
            intent.needs_statistics = true;
        }
        if any_hit(&q, &t.species) {
            intent.needs_species = true;
            intent.needs_statistics = true;
        }
        if any_hit(&q, &t.regulations) {
            intent.needs_regulations = true;
        }
        if any_hit(&q, &t.platform) {
            intent.needs_platform_info = true;
        }
        if any_hit(&q, &t.comparison) {
            intent.needs_comparison = true;
            intent.needs_statistics = true;
            intent.needs_weather = true;
        }

        tracing::debug!(?intent, "classified question");
        intent
    }

    fn resolve_location(&self, lowered: &str) -> String {
        self.table
            .locations
            .iter()
            .find(|a| lowered.contains(a.keyword.as_str()))
            .map(|a| a.name.clone())
            .unwrap_or_else(|| self.table.default_location.clone())
    }
}

fn any_hit(lowered: &str, keywords: &[String]) -> bool {
    keywords.iter().any(|k| lowered.contains(k.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(q: &str) -> QuestionIntent {
        Classifier::default().classify(q)
    }

    #[test]
    fn fishing_question_needs_weather_and_tide() {
        let intent = classify("Quand pêcher à Kayar demain ?");
        assert!(intent.needs_weather);
        assert!(intent.needs_tide);
        assert_eq!(intent.location, "Kayar");
    }

    #[test]
    fn every_fishing_term_sets_both_flags() {
        let classifier = Classifier::default();
        for term in &classifier.table().fishing.clone() {
            let intent = classifier.classify(&format!("Est-ce que je peux {} ?", term));
            assert!(intent.needs_weather && intent.needs_tide, "term {:?}", term);
        }
    }

    #[test]
    fn matching_is_case_insensitive() {
        let intent = classify("QUELLE EST LA MÉTÉO À MBOUR");
        assert!(intent.needs_weather);
        assert!(!intent.needs_tide);
        assert_eq!(intent.location, "Mbour");
    }

    #[test]
    fn no_location_defaults_to_dakar() {
        for q in ["Quel temps fait-il ?", "Bonjour", "", "Prix du thiof"] {
            assert_eq!(classify(q).location, "Dakar", "question {:?}", q);
        }
    }

    #[test]
    fn location_ties_follow_list_order() {
        // kayar appears first in the text but dakar is earlier in the table
        assert_eq!(classify("De Kayar vers Dakar").location, "Dakar");
    }

    #[test]
    fn saint_louis_variants_resolve() {
        assert_eq!(classify("marée à saint louis").location, "Saint-Louis");
        assert_eq!(classify("marée à Saint-Louis").location, "Saint-Louis");
        assert_eq!(classify("météo Joal").location, "Joal-Fadiouth");
    }

    #[test]
    fn comparison_sets_statistics_and_weather() {
        let intent = classify("Comparer Mbour et Joal");
        assert!(intent.needs_comparison);
        assert!(intent.needs_statistics);
        assert!(intent.needs_weather);
        assert!(!intent.needs_tide);
    }

    #[test]
    fn species_sets_statistics() {
        let intent = classify("Où trouver le thiof ?");
        assert!(intent.needs_species);
        assert!(intent.needs_statistics);
        assert!(!intent.needs_weather);
    }

    #[test]
    fn regulations_and_platform_flags() {
        let intent = classify("Quelle est la loi sur le repos biologique ?");
        assert!(intent.needs_regulations);
        assert!(!intent.needs_platform_info);

        let intent = classify("Comment utiliser SunuPecheNet ?");
        assert!(intent.needs_platform_info);
    }

    #[test]
    fn statistics_only_question_skips_weather() {
        let intent = classify("Évolution des débarquements en 2019");
        assert!(intent.needs_statistics);
        assert!(!intent.needs_weather);
        assert!(!intent.needs_tide);
    }

    #[test]
    fn config_overrides_replace_lists() {
        let config = ClassifierConfig {
            default_location: "Mbour".to_string(),
            weather: Some(vec!["WIND".to_string()]),
            locations: Some(vec![LocationAlias {
                keyword: "Rufisque".to_string(),
                name: "Rufisque".to_string(),
            }]),
            ..ClassifierConfig::default()
        };
        let classifier = Classifier::new(KeywordTable::from_config(&config));

        assert!(classifier.classify("strong wind today").needs_weather);
        assert!(!classifier.classify("météo").needs_weather);
        assert_eq!(classifier.classify("à rufisque").location, "Rufisque");
        assert_eq!(classifier.classify("à dakar").location, "Mbour");
        // untouched lists keep the defaults
        assert!(classifier.classify("marée").needs_tide);
    }
}
