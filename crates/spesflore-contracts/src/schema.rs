use serde_json::{json, Value};

fn string_field() -> Value {
    json!({ "type": "STRING" })
}

fn described_string(description: &str) -> Value {
    json!({ "type": "STRING", "description": description })
}

pub fn botanical_record_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "commonName": string_field(),
            "scientificName": string_field(),
            "family": string_field(),
            "vegetativeApparatus": {
                "type": "OBJECT",
                "properties": {
                    "root": string_field(),
                    "stem": string_field(),
                    "leaves": string_field(),
                },
                "required": ["root", "stem", "leaves"],
            },
            "reproductiveApparatus": {
                "type": "OBJECT",
                "properties": {
                    "flower": string_field(),
                    "fruit": string_field(),
                    "inflorescence": {
                        "type": "OBJECT",
                        "properties": {
                            "description": string_field(),
                            "parts": { "type": "ARRAY", "items": string_field() },
                        },
                        "required": ["description", "parts"],
                    },
                    "ovary": {
                        "type": "OBJECT",
                        "properties": {
                            "description": string_field(),
                            "sectionDetails": string_field(),
                        },
                        "required": ["description", "sectionDetails"],
                    },
                },
                "required": ["flower", "fruit", "inflorescence", "ovary"],
            },
            "floralFormula": string_field(),
            "floralDiagramSVG": described_string(
                "Un code SVG stylisé représentant le diagramme floral de l'espèce."
            ),
            "inflorescenceSVG": described_string(
                "Un dessin SVG montrant l'inflorescence et ses parties avec légendes."
            ),
            "ovarySectionSVG": described_string(
                "Un dessin SVG montrant une coupe longitudinale de l'ovaire avec légendes."
            ),
        },
        "required": [
            "commonName",
            "scientificName",
            "family",
            "vegetativeApparatus",
            "reproductiveApparatus",
            "floralFormula",
            "floralDiagramSVG",
            "inflorescenceSVG",
            "ovarySectionSVG",
        ],
    })
}

pub fn discovery_schema() -> Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "name": string_field(),
                "scientific": string_field(),
                "family": string_field(),
                "description": string_field(),
            },
            "required": ["name", "scientific", "family", "description"],
        },
    })
}
