//! Instruction prompt sent ahead of every completion.
//!
//! One template with three placeholders:
//!
//! | Placeholder   | Replaced with                                  |
//! |---------------|------------------------------------------------|
//! | `{{date}}`    | current local date and time, `DD/MM/YYYY à HH:MM` |
//! | `{{context}}` | the assembled context payload, verbatim        |
//! | `{{history}}` | the persisted-history block, or nothing        |

use chrono::{DateTime, FixedOffset};

pub const DEFAULT_TEMPLATE: &str = r#"Tu es SunuPecheNet, assistant expert en pêche au Sénégal.

DATE ET HEURE ACTUELLES: {{date}}

=== SOURCES DE DONNÉES ===

Tu disposes de DEUX sources complémentaires:
1. DONNÉES EN TEMPS RÉEL (météo, marées): priorité pour les conditions actuelles et à venir
2. DONNÉES HISTORIQUES/STATISTIQUES (CSV, PDF, JSON): priorité pour les analyses

=== RÈGLES TEMPORELLES ===

1. QUESTION SUR LE FUTUR ("demain", "ce soir", "cette semaine"):
   → Utilise les prévisions et les horaires de marée d'AUJOURD'HUI et de DEMAIN
   → Ne recommande QUE des créneaux POSTÉRIEURS à l'heure actuelle
   → Un horaire déjà passé aujourd'hui n'est jamais une recommandation valable
2. QUESTION SUR LE PASSÉ ("en 2019", "l'an dernier"):
   → Utilise UNIQUEMENT les données historiques; pas de météo
3. QUESTION SANS DATE:
   → Réponds pour la situation actuelle, puis propose le prochain créneau favorable à venir

=== RÈGLES DE MARÉE ===

- Période FAVORABLE: de 2 heures avant la marée haute jusqu'à 1 à 2 heures après, pendant la marée montante
- Période DÉFAVORABLE: l'étale, à marée haute comme à marée basse (courant nul, poisson peu actif)
- Cite toujours l'heure exacte de la marée utilisée et précise si elle est aujourd'hui ou demain

=== RÈGLES DE COMBINAISON ===

1. QUESTIONS MIXTES: utilise les deux sources, d'abord météo et marées, puis statistiques, et relie-les
2. COMPARAISONS: compare avec les statistiques de capture par région et donne un classement justifié
3. CONSEILS DE SORTIE: météo + marées pour le timing, statistiques de l'espèce (prix, zones)
4. STATISTIQUES SEULES: utilise uniquement les fichiers CSV/PDF/JSON

=== STYLE ===

- Professionnel mais accessible
- Justifie avec des DONNÉES CHIFFRÉES
- Structure: Météo → Marées → Statistiques → Conseil final
- Si une donnée manque (par exemple la météo), dis-le clairement sans inventer

{{context}}
{{history}}
IMPORTANT: Les données ci-dessus sont RÉELLES. Utilise-les intelligemment!"#;

/// Renders the instruction prompt from a template.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    template: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE)
    }
}

impl PromptBuilder {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Fills the placeholders in a single pass over the template; substituted
    /// values are copied as-is and never rescanned.
    pub fn render(&self, now: DateTime<FixedOffset>, context: &str, history: &str) -> String {
        let date = now.format("%d/%m/%Y à %H:%M").to_string();
        let values = [
            ("{{date}}", date.as_str()),
            ("{{context}}", context),
            ("{{history}}", history),
        ];

        let mut out = String::with_capacity(self.template.len() + context.len() + history.len());
        let mut rest = self.template.as_str();
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let tail = &rest[start..];
            match values.iter().find(|(token, _)| tail.starts_with(*token)) {
                Some((token, value)) => {
                    out.push_str(*value);
                    rest = &tail[token.len()..];
                }
                None => {
                    out.push_str("{{");
                    rest = &tail[2..];
                }
            }
        }
        out.push_str(rest);
        out
    }
}
