use std::io::Cursor;

use anyhow::{bail, Context, Result};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use spesflore_contracts::botany::scientific_key;

use crate::backend::{ContentPart, GenerateRequest, GenerateResponse, GenerativeBackend};

const PREVIEW_SIZE: u32 = 64;
const RING_RADII: [u32; 4] = [150, 105, 60, 30];

const CATALOG: &[(&str, &str, &str, &str)] = &[
    (
        "Rose des chiens",
        "Rosa canina",
        "Rosaceae",
        "Églantier des haies dont les cynorrhodons rouges persistent tout l'hiver.",
    ),
    (
        "Monstera",
        "Monstera deliciosa",
        "Araceae",
        "Liane tropicale aux feuilles perforées qui laissent passer la lumière du sous-bois.",
    ),
    (
        "Welwitschia",
        "Welwitschia mirabilis",
        "Welwitschiaceae",
        "Relique du désert du Namib qui ne produit que deux feuilles en plusieurs siècles.",
    ),
    (
        "Lotus sacré",
        "Nelumbo nucifera",
        "Nelumbonaceae",
        "Ses feuilles déperlantes restent propres grâce à une microstructure cireuse.",
    ),
    (
        "Baobab africain",
        "Adansonia digitata",
        "Malvaceae",
        "Arbre-bouteille capable de stocker des milliers de litres d'eau dans son tronc.",
    ),
    (
        "Népenthès",
        "Nepenthes rajah",
        "Nepenthaceae",
        "Plante carnivore dont les urnes géantes piègent insectes et petits vertébrés.",
    ),
    (
        "Orchidée papillon",
        "Phalaenopsis amabilis",
        "Orchidaceae",
        "Épiphyte des forêts humides aux fleurs blanches en forme d'ailes.",
    ),
    (
        "Séquoia géant",
        "Sequoiadendron giganteum",
        "Cupressaceae",
        "Le plus massif des arbres vivants, protégé du feu par une écorce épaisse.",
    ),
    (
        "Arum titan",
        "Amorphophallus titanum",
        "Araceae",
        "Inflorescence géante à l'odeur de charogne qui attire ses pollinisateurs.",
    ),
    (
        "Ginkgo",
        "Ginkgo biloba",
        "Ginkgoaceae",
        "Fossile vivant aux feuilles en éventail qui virent au jaune d'or en automne.",
    ),
    (
        "Protée royale",
        "Protea cynaroides",
        "Proteaceae",
        "Emblème du fynbos sud-africain aux capitules spectaculaires.",
    ),
    (
        "Lavande vraie",
        "Lavandula angustifolia",
        "Lamiaceae",
        "Sous-arbrisseau méditerranéen mellifère aux épis parfumés.",
    ),
];

pub struct DryrunBackend;

impl DryrunBackend {
    fn identify(request: &GenerateRequest) -> Result<GenerateResponse> {
        let subject = request
            .metadata
            .get("query_text")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or("Plante photographiée");
        let (name, scientific, family) = CATALOG
            .iter()
            .find(|(name, scientific, _, _)| {
                let wanted = scientific_key(subject);
                scientific_key(name) == wanted || scientific_key(scientific) == wanted
            })
            .map(|(name, scientific, family, _)| (*name, *scientific, *family))
            .unwrap_or((subject, "Planta ignota", "Incertae sedis"));
        let stroke = color_hex(&request.prompt_text());

        let record = json!({
            "commonName": name,
            "scientificName": scientific,
            "family": family,
            "vegetativeApparatus": {
                "root": format!("Système racinaire fasciculé de {name}."),
                "stem": "Tige dressée, herbacée à la base puis lignifiée.",
                "leaves": "Feuilles alternes, simples, à limbe entier.",
            },
            "reproductiveApparatus": {
                "flower": "Fleur hermaphrodite, actinomorphe, pentamère.",
                "fruit": "Capsule sèche déhiscente.",
                "inflorescence": {
                    "description": "Grappe terminale de fleurs pédicellées.",
                    "parts": ["axe principal", "bractée", "pédicelle", "fleur"],
                },
                "ovary": {
                    "description": "Ovaire supère à placentation axile.",
                    "sectionDetails": "Trois loges contenant chacune de nombreux ovules.",
                },
            },
            "floralFormula": "*K5 C5 A5 G(3)",
            "floralDiagramSVG": labelled_svg(&stroke, "Diagramme floral", &["sépale", "pétale", "étamine"]),
            "inflorescenceSVG": labelled_svg(&stroke, "Inflorescence", &["axe", "bractée", "fleur"]),
            "ovarySectionSVG": labelled_svg(&stroke, "Coupe de l'ovaire", &["loge", "ovule", "placenta"]),
        });
        Ok(GenerateResponse::from_text(serde_json::to_string(&record)?))
    }

    fn discover(request: &GenerateRequest) -> Result<GenerateResponse> {
        let count = request
            .metadata
            .get("count")
            .and_then(Value::as_u64)
            .unwrap_or(3) as usize;
        let excluded = request
            .metadata
            .get("exclude")
            .and_then(Value::as_array)
            .map(|rows| {
                rows.iter()
                    .filter_map(Value::as_str)
                    .map(scientific_key)
                    .collect::<Vec<String>>()
            })
            .unwrap_or_default();
        let rows = CATALOG
            .iter()
            .filter(|(_, scientific, _, _)| !excluded.contains(&scientific_key(scientific)))
            .take(count)
            .map(|(name, scientific, family, description)| {
                json!({
                    "name": name,
                    "scientific": scientific,
                    "family": family,
                    "description": description,
                })
            })
            .collect::<Vec<Value>>();
        Ok(GenerateResponse::from_text(serde_json::to_string(&rows)?))
    }

    fn image(request: &GenerateRequest) -> Result<GenerateResponse> {
        let digest = prompt_digest(&request.prompt_text());
        let mut image = RgbImage::new(PREVIEW_SIZE, PREVIEW_SIZE);
        for pixel in image.pixels_mut() {
            *pixel = Rgb([digest[0], digest[1], digest[2]]);
        }
        let mut bytes = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(image)
            .write_to(&mut bytes, ImageFormat::Png)
            .context("dryrun preview encode failed")?;
        Ok(GenerateResponse {
            parts: vec![ContentPart::inline_bytes(bytes.get_ref(), "image/png")],
            finish_reason: Some("STOP".to_string()),
        })
    }
}

impl GenerativeBackend for DryrunBackend {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        match request.operation() {
            Some("identify") => Self::identify(request),
            Some("discover") => Self::discover(request),
            Some("generate_image") => Self::image(request),
            Some(other) => bail!("dryrun backend does not handle operation '{other}'"),
            None => bail!("dryrun backend requires an operation in request metadata"),
        }
    }
}

fn prompt_digest(prompt: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.finalize().to_vec()
}

fn color_hex(prompt: &str) -> String {
    let digest = prompt_digest(prompt);
    // Darkened so labels stay readable on white.
    let dark = digest[..3].iter().map(|byte| byte / 3).collect::<Vec<u8>>();
    format!("#{}", hex::encode(dark))
}

fn labelled_svg(stroke: &str, title: &str, labels: &[&str]) -> String {
    let mut body = String::new();
    for (label, radius) in labels.iter().zip(RING_RADII.iter().cycle()) {
        let label_y = 200 - radius + 20;
        body.push_str(&format!(
            "<circle cx=\"200\" cy=\"200\" r=\"{radius}\" fill=\"none\" stroke=\"{stroke}\" stroke-width=\"2\"/>\
             <text x=\"200\" y=\"{label_y}\" text-anchor=\"middle\" font-size=\"14\" fill=\"#000\">{label}</text>"
        ));
    }
    format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"400\" height=\"400\" viewBox=\"0 0 400 400\">\
         <rect width=\"400\" height=\"400\" fill=\"#fff\"/>\
         <text x=\"200\" y=\"24\" text-anchor=\"middle\" font-size=\"18\" fill=\"#000\">{title}</text>{body}</svg>"
    )
}
