use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VegetativeApparatus {
    pub root: String,
    pub stem: String,
    pub leaves: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inflorescence {
    pub description: String,
    pub parts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ovary {
    pub description: String,
    pub section_details: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReproductiveApparatus {
    pub flower: String,
    pub fruit: String,
    pub inflorescence: Inflorescence,
    pub ovary: Ovary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotanicalRecord {
    pub common_name: String,
    pub scientific_name: String,
    pub family: String,
    pub vegetative_apparatus: VegetativeApparatus,
    pub reproductive_apparatus: ReproductiveApparatus,
    pub floral_formula: String,
    #[serde(rename = "floralDiagramSVG")]
    pub floral_diagram_svg: String,
    #[serde(rename = "inflorescenceSVG")]
    pub inflorescence_svg: String,
    #[serde(rename = "ovarySectionSVG")]
    pub ovary_section_svg: String,
}

impl BotanicalRecord {
    pub fn blank_fields(&self) -> Vec<String> {
        let vegetative = &self.vegetative_apparatus;
        let reproductive = &self.reproductive_apparatus;
        let checks: [(&str, &String); 15] = [
            ("commonName", &self.common_name),
            ("scientificName", &self.scientific_name),
            ("family", &self.family),
            ("vegetativeApparatus.root", &vegetative.root),
            ("vegetativeApparatus.stem", &vegetative.stem),
            ("vegetativeApparatus.leaves", &vegetative.leaves),
            ("reproductiveApparatus.flower", &reproductive.flower),
            ("reproductiveApparatus.fruit", &reproductive.fruit),
            (
                "reproductiveApparatus.inflorescence.description",
                &reproductive.inflorescence.description,
            ),
            (
                "reproductiveApparatus.ovary.description",
                &reproductive.ovary.description,
            ),
            (
                "reproductiveApparatus.ovary.sectionDetails",
                &reproductive.ovary.section_details,
            ),
            ("floralFormula", &self.floral_formula),
            ("floralDiagramSVG", &self.floral_diagram_svg),
            ("inflorescenceSVG", &self.inflorescence_svg),
            ("ovarySectionSVG", &self.ovary_section_svg),
        ];
        let mut blank = checks
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(path, _)| (*path).to_string())
            .collect::<Vec<String>>();
        for (idx, part) in reproductive.inflorescence.parts.iter().enumerate() {
            if part.trim().is_empty() {
                blank.push(format!("reproductiveApparatus.inflorescence.parts[{idx}]"));
            }
        }
        blank
    }

    pub fn is_complete(&self) -> bool {
        self.blank_fields().is_empty()
    }

    pub fn diagrams(&self) -> [(&'static str, &str); 3] {
        [
            ("floral-diagram", self.floral_diagram_svg.as_str()),
            ("inflorescence", self.inflorescence_svg.as_str()),
            ("ovary-section", self.ovary_section_svg.as_str()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlantSuggestion {
    pub name: String,
    pub scientific: String,
    pub family: String,
    pub description: String,
}

impl PlantSuggestion {
    pub fn is_complete(&self) -> bool {
        [&self.name, &self.scientific, &self.family, &self.description]
            .iter()
            .all(|value| !value.trim().is_empty())
    }

    pub fn scientific_key(&self) -> String {
        scientific_key(&self.scientific)
    }
}

pub fn scientific_key(scientific: &str) -> String {
    scientific
        .split_whitespace()
        .collect::<Vec<&str>>()
        .join(" ")
        .to_lowercase()
}

/// A gallery entry. The preview image arrives after the base record exists and
/// may never arrive; `None` means "still generating" to the surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredPlant {
    pub id: String,
    pub name: String,
    pub scientific: String,
    pub family: String,
    pub description: String,
    pub image: Option<String>,
}

impl DiscoveredPlant {
    pub fn from_suggestion(suggestion: PlantSuggestion, image: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: suggestion.name,
            scientific: suggestion.scientific,
            family: suggestion.family,
            description: suggestion.description,
            image,
        }
    }

    pub fn has_preview(&self) -> bool {
        self.image.is_some()
    }
}

#[cfg(test)]
pub(crate) fn sample_record() -> BotanicalRecord {
    BotanicalRecord {
        common_name: "Rose".to_string(),
        scientific_name: "Rosa canina".to_string(),
        family: "Rosaceae".to_string(),
        vegetative_apparatus: VegetativeApparatus {
            root: "Racine pivotante".to_string(),
            stem: "Tige ligneuse épineuse".to_string(),
            leaves: "Feuilles composées imparipennées".to_string(),
        },
        reproductive_apparatus: ReproductiveApparatus {
            flower: "Fleur actinomorphe à cinq pétales".to_string(),
            fruit: "Cynorrhodon".to_string(),
            inflorescence: Inflorescence {
                description: "Corymbe pauciflore".to_string(),
                parts: vec!["pédoncule".to_string(), "bractée".to_string()],
            },
            ovary: Ovary {
                description: "Ovaire infère".to_string(),
                section_details: "Carpelles libres dans un réceptacle creux".to_string(),
            },
        },
        floral_formula: "*K5 C5 A∞ G∞".to_string(),
        floral_diagram_svg: "<svg width=\"400\" height=\"400\"></svg>".to_string(),
        inflorescence_svg: "<svg width=\"400\" height=\"400\"></svg>".to_string(),
        ovary_section_svg: "<svg width=\"400\" height=\"400\"></svg>".to_string(),
    }
}
