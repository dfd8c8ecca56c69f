//! Records produced by the analysis stages.
//!
//! Segments are created once by preprocessing. Claims, biases and verified
//! claims all point back at a segment through `segment_id`.

use std::collections::{BTreeMap, HashSet};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A contiguous slice of the cleaned input text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Position of the chunk in the original text, starting at 0
    pub id: u32,

    /// Text of the chunk
    pub content: String,
}

impl Segment {
    pub fn new(id: u32, content: impl Into<String>) -> Self {
        Self {
            id,
            content: content.into(),
        }
    }
}

/// Render segments as prompt lines: `id: <id> - content: <content>`.
pub fn format_segments(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(|segment| format!("id: {} - content: {}", segment.id, segment.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Anything that points back at a segment.
pub trait SegmentScoped {
    fn segment_id(&self) -> u32;
}

/// Drop items whose segment id does not exist among `segments`.
///
/// Returns the number of dropped items.
pub fn retain_known_segments<T: SegmentScoped>(items: &mut Vec<T>, segments: &[Segment]) -> usize {
    let known: HashSet<u32> = segments.iter().map(|s| s.id).collect();
    let before = items.len();
    items.retain(|item| known.contains(&item.segment_id()));
    before - items.len()
}

// ============================================================================
// Claims
// ============================================================================

/// A factual assertion extracted from a segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Claim {
    /// The factual assertion, phrased so it stands on its own
    pub content: String,

    /// Segment the claim was extracted from
    pub segment_id: u32,
}

impl SegmentScoped for Claim {
    fn segment_id(&self) -> u32 {
        self.segment_id
    }
}

/// Collection of extracted claims.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Claims {
    /// Claims found in the text
    pub items: Vec<Claim>,
}

impl Claims {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn format_for_prompt(&self) -> String {
        self.items
            .iter()
            .map(|claim| format!("id: {} - content: {}", claim.segment_id, claim.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ============================================================================
// Biases
// ============================================================================

/// A rhetorical or ideological distortion found in a segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Bias {
    /// The biased passage
    pub content: String,

    /// Segment the bias was found in
    pub segment_id: u32,

    /// Kind of bias (emotional, ideological, exaggeration, omission, other)
    pub bias_type: String,

    /// Short justification
    pub explanation: String,
}

impl SegmentScoped for Bias {
    fn segment_id(&self) -> u32 {
        self.segment_id
    }
}

/// Collection of detected biases.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Biases {
    /// Biases found in the text
    pub items: Vec<Bias>,
}

impl Biases {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn format_for_prompt(&self) -> String {
        self.items
            .iter()
            .map(|bias| {
                format!(
                    "segment_id: {} - content: {} - type: {} - explanation: {}",
                    bias.segment_id, bias.content, bias.bias_type, bias.explanation
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ============================================================================
// Verified claims
// ============================================================================

/// Truth classification of a verified claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    True,
    False,
    PartiallyTrue,
    Unverifiable,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::True => "true",
            Self::False => "false",
            Self::PartiallyTrue => "partially_true",
            Self::Unverifiable => "unverifiable",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A claim together with its verification outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct VerifiedClaim {
    /// The claim as it was verified
    pub content: String,

    /// Segment the claim was extracted from
    pub segment_id: u32,

    /// Verification verdict
    pub verdict: Verdict,

    /// Short factual explanation of the verdict
    pub explanation: String,

    /// Sources or knowledge used for the verification
    pub sources: Vec<String>,
}

impl SegmentScoped for VerifiedClaim {
    fn segment_id(&self) -> u32 {
        self.segment_id
    }
}

/// Collection of verified claims.
///
/// Nothing forces one entry per input claim: the model may merge, drop or
/// split claims while verifying them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct VerifiedClaims {
    /// Verification results
    pub items: Vec<VerifiedClaim>,
}

impl VerifiedClaims {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn format_for_prompt(&self) -> String {
        self.items
            .iter()
            .map(|claim| {
                format!(
                    "segment_id: {} - content: {} - verdict: {} - explanation: {}",
                    claim.segment_id, claim.content, claim.verdict, claim.explanation
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ============================================================================
// Per-segment view
// ============================================================================

/// A segment with the verified claims and biases that reference it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzedSegment {
    pub id: u32,
    pub content: String,
    #[serde(default)]
    pub claims: Vec<VerifiedClaim>,
    #[serde(default)]
    pub biases: Vec<Bias>,
}

/// Group verified claims and biases by segment id.
///
/// Only segments referenced by at least one claim or bias appear, ordered
/// by id. Content is copied from `segments` when the id is known.
pub fn group_by_segment(
    segments: &[Segment],
    verified_claims: &VerifiedClaims,
    biases: &Biases,
) -> Vec<AnalyzedSegment> {
    let mut grouped: BTreeMap<u32, AnalyzedSegment> = BTreeMap::new();

    let entry = |grouped: &mut BTreeMap<u32, AnalyzedSegment>, id: u32| {
        grouped.entry(id).or_insert_with(|| AnalyzedSegment {
            id,
            content: segments
                .iter()
                .find(|s| s.id == id)
                .map(|s| s.content.clone())
                .unwrap_or_default(),
            claims: Vec::new(),
            biases: Vec::new(),
        });
    };

    for claim in &verified_claims.items {
        entry(&mut grouped, claim.segment_id);
        if let Some(segment) = grouped.get_mut(&claim.segment_id) {
            segment.claims.push(claim.clone());
        }
    }

    for bias in &biases.items {
        entry(&mut grouped, bias.segment_id);
        if let Some(segment) = grouped.get_mut(&bias.segment_id) {
            segment.biases.push(bias.clone());
        }
    }

    grouped.into_values().collect()
}
