pub mod biomarker;

pub use biomarker::{BiomarkerStatus, BiomarkerValue, ClassifiedBiomarker};
