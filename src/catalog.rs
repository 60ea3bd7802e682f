//! Condition catalog
//!
//! Static, process-wide table of the conditions a simulated patient can be
//! assigned, with their ordered symptoms and the treatment keywords that the
//! patient accepts or refuses.

use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;

/// One condition and everything the dialog policy needs to know about it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionEntry {
    pub name: String,
    /// Symptoms in disclosure order
    pub symptoms: Vec<String>,
    /// Lower-case substrings that make the patient accept a treatment
    pub accepted_keywords: Vec<String>,
    /// Lower-case substrings that make the patient refuse a treatment
    pub rejected_keywords: Vec<String>,
}

impl ConditionEntry {
    pub fn new(name: &str, symptoms: &[&str], accepted: &[&str], rejected: &[&str]) -> Self {
        let owned = |items: &[&str]| items.iter().map(|s| (*s).to_string()).collect();
        let lowered = |items: &[&str]| items.iter().map(|s| s.to_lowercase()).collect();
        Self {
            name: name.to_string(),
            symptoms: owned(symptoms),
            accepted_keywords: lowered(accepted),
            rejected_keywords: lowered(rejected),
        }
    }
}

/// Read-only lookup table shared by every conversation
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: HashMap<String, Arc<ConditionEntry>>,
}

impl Catalog {
    pub fn from_entries(entries: impl IntoIterator<Item = ConditionEntry>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|e| (e.name.clone(), Arc::new(e)))
                .collect(),
        }
    }

    /// The conditions shipped with the simulator
    pub fn builtin() -> Self {
        Self::from_entries([
            ConditionEntry::new(
                "common cold",
                &[
                    "runny nose",
                    "sore throat",
                    "mild cough",
                    "congestion",
                    "fatigue",
                    "sneezing",
                ],
                &[
                    "rest",
                    "fluids",
                    "hydration",
                    "steam inhalation",
                    "saline nasal spray",
                    "pain reliever",
                    "paracetamol",
                    "ibuprofen",
                    "warm liquids",
                ],
                &[
                    "antibiotics",
                    "antifungals",
                    "steroids",
                    "antiviral medications",
                ],
            ),
            ConditionEntry::new(
                "fever",
                &[
                    "high temperature",
                    "chills",
                    "sweating",
                    "headache",
                    "body aches",
                    "weakness",
                ],
                &[
                    "paracetamol",
                    "acetaminophen",
                    "ibuprofen",
                    "rest",
                    "fluids",
                    "cool compress",
                ],
                &["antibiotics", "antimalarials", "antivirals"],
            ),
            ConditionEntry::new(
                "dengue",
                &[
                    "high fever",
                    "severe headache",
                    "pain behind eyes",
                    "joint pain",
                    "muscle pain",
                    "rash",
                ],
                &[
                    "paracetamol",
                    "acetaminophen",
                    "hydration",
                    "oral rehydration salts",
                    "rest",
                    "monitor platelet count",
                ],
                &["ibuprofen", "aspirin", "antibiotics", "steroids"],
            ),
            ConditionEntry::new(
                "migraine",
                &[
                    "severe headache",
                    "nausea",
                    "sensitivity to light",
                    "sensitivity to sound",
                    "visual disturbances",
                ],
                &[
                    "ibuprofen",
                    "naproxen",
                    "acetaminophen",
                    "rest in a dark room",
                    "hydration",
                    "cold compress",
                ],
                &["antibiotics", "antacids"],
            ),
            ConditionEntry::new(
                "bacterial pneumonia",
                &[
                    "cough with phlegm",
                    "fever",
                    "chest pain",
                    "difficulty breathing",
                    "fatigue",
                    "chills",
                ],
                &["antibiotics", "rest", "fluids", "fever reducers"],
                &["antivirals", "homeopathy", "aspirin for children"],
            ),
            ConditionEntry::new(
                "gastric acidity",
                &[
                    "heartburn",
                    "chest discomfort",
                    "bitter taste",
                    "bloating",
                    "nausea",
                    "burping",
                ],
                &[
                    "antacids",
                    "proton pump inhibitors",
                    "H2 blockers",
                    "avoiding spicy foods",
                ],
                &["antibiotics", "pain relievers like ibuprofen"],
            ),
        ])
    }

    pub fn get(&self, name: &str) -> Option<Arc<ConditionEntry>> {
        self.entries.get(name).cloned()
    }

    /// Condition names, sorted for stable output
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pick a condition uniformly at random
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Arc<ConditionEntry>> {
        let names = self.names();
        let name = names.choose(rng)?;
        self.get(name)
    }
}

/// Take a random-length prefix of the entry's symptom list.
///
/// The length is drawn from `min..=max` and clamped to the number of symptoms
/// the condition has, so the result never invents symptoms.
pub fn symptom_prefix<R: Rng + ?Sized>(
    entry: &ConditionEntry,
    min: usize,
    max: usize,
    rng: &mut R,
) -> Vec<String> {
    let available = entry.symptoms.len();
    let lo = min.min(available);
    let hi = max.max(lo).min(available);
    let count = rng.gen_range(lo..=hi);
    entry.symptoms.iter().take(count).cloned().collect()
}
