//! Conversion of recognition results into the PII-detection request format.

use crate::languages::{LanguageSet, DEFAULT_LANGUAGE};
use crate::pipeline::DocumentKind;
use crate::schema::{Block, DocumentResult, Page};
use serde::Serialize;
use uuid::Uuid;

/// Entity types requested from the PII detector.
pub const ENTITIES_TO_DETECT: &[&str] = &[
    "AADHAAR",
    "PAN",
    "PHONE",
    "EMAIL",
    "NAME",
    "ADDRESS",
    "AGE",
    "SEX",
    "GENDER",
    "DATE",
    "MEDICAL_RECORD_NUMBER",
    "PATIENT_ID",
    "INSURANCE_NUMBER",
    "ACCOUNT_NUMBER",
    "MEDICAL_CONDITION",
    "MEDICATION",
    "TREATMENT_INFO",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Span {
    pub span_id: String,
    pub text: String,
    pub bbox: BBox,
    pub page_no: u32,
    pub language: String,
    pub ocr_confidence: f64,
}

/// Page dimensions are not tracked; always serialized as `{}`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PageSize {}

#[derive(Debug, Clone, Serialize)]
pub struct RequestPage {
    pub page_no: u32,
    pub page_size: PageSize,
    pub spans: Vec<Span>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestOptions {
    pub entities_to_detect: Vec<String>,
    pub use_llm_validation: bool,
    pub languages: Vec<String>,
}

/// Body of a PII-detection request for one document.
#[derive(Debug, Clone, Serialize)]
pub struct RedactionRequest {
    pub document_id: String,
    pub file_type: DocumentKind,
    pub pages: Vec<RequestPage>,
    pub options: RequestOptions,
}

impl RedactionRequest {
    /// Build a request from `result`.
    ///
    /// Every span is tagged with `primary_language` (the first language the
    /// client asked for); `languages` fills the request options.
    pub fn from_document(
        result: &DocumentResult,
        document_id: impl Into<String>,
        file_type: DocumentKind,
        primary_language: Option<&str>,
        languages: &LanguageSet,
    ) -> Self {
        let language = primary_language.unwrap_or(DEFAULT_LANGUAGE);
        Self {
            document_id: document_id.into(),
            file_type,
            pages: result
                .pages
                .iter()
                .map(|page| request_page(page, language))
                .collect(),
            options: RequestOptions {
                entities_to_detect: ENTITIES_TO_DETECT.iter().map(|e| e.to_string()).collect(),
                use_llm_validation: false,
                languages: languages.iter().map(str::to_string).collect(),
            },
        }
    }

    pub fn span_count(&self) -> usize {
        self.pages.iter().map(|p| p.spans.len()).sum()
    }
}

fn request_page(page: &Page, language: &str) -> RequestPage {
    RequestPage {
        page_no: page.page_number,
        page_size: PageSize::default(),
        spans: page
            .blocks
            .iter()
            .map(|block| span(block, page.page_number, language))
            .collect(),
    }
}

fn span(block: &Block, page_no: u32, language: &str) -> Span {
    let [x1, y1] = block.position.top_left;
    let [x2, y2] = block.position.bottom_right;
    Span {
        span_id: Uuid::new_v4().to_string(),
        text: block.text.clone(),
        bbox: BBox { x1, y1, x2, y2 },
        page_no,
        language: language.to_string(),
        ocr_confidence: block.confidence,
    }
}
