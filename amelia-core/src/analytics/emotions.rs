//! Emotion breakdown across primary-emotion insights.

use crate::types::PrimaryEmotionsContent;
use serde::Serialize;

/// Basic emotions the breakdown reports. Other labels are dropped.
pub const BASIC_EMOTIONS: [&str; 6] = ["joy", "sadness", "anger", "fear", "surprise", "disgust"];

/// Colours for colour-less labels, handed out in first-appearance order.
pub const FALLBACK_PALETTE: [&str; 6] = [
    "#A5E3D0", "#6CAEDD", "#C7B7E8", "#F97316", "#EF4444", "#10B981",
];

/// Most triggers/contexts kept per emotion
const MAX_EXAMPLES: usize = 5;

fn emotion_color(label: &str) -> Option<&'static str> {
    match label {
        "joy" => Some("#A5E3D0"),
        "sadness" => Some("#6CAEDD"),
        "anger" => Some("#EF4444"),
        "fear" => Some("#F59E0B"),
        "disgust" => Some("#10B981"),
        "surprise" => Some("#C7B7E8"),
        _ => None,
    }
}

/// One emotion with its occurrences folded together.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmotionSummary {
    /// Lowercase label, e.g. `joy`
    pub label: String,
    /// Label with its first letter capitalised, e.g. `Joy`
    pub display_name: String,
    pub count: usize,
    /// Mean of the intensities present, `None` if no item carried one
    pub avg_intensity: Option<f64>,
    pub triggers: Vec<String>,
    pub contexts: Vec<String>,
    pub color: String,
}

#[derive(Default)]
struct Bucket {
    label: String,
    count: usize,
    intensities: Vec<f64>,
    triggers: Vec<String>,
    contexts: Vec<String>,
}

/// Group the emotion items of all `contents` by lowercase label.
///
/// Groups come out in the order their label first appears.
pub fn aggregate_emotions(contents: &[PrimaryEmotionsContent]) -> Vec<EmotionSummary> {
    let mut buckets: Vec<Bucket> = Vec::new();

    let items = contents.iter().flat_map(|c| c.primary_emotions.iter());
    for item in items {
        let Some(label) = item.emotion.as_deref().map(str::to_lowercase) else {
            continue;
        };
        if !BASIC_EMOTIONS.contains(&label.as_str()) {
            continue;
        }

        let idx = match buckets.iter().position(|b| b.label == label) {
            Some(idx) => idx,
            None => {
                buckets.push(Bucket {
                    label,
                    ..Default::default()
                });
                buckets.len() - 1
            }
        };
        let bucket = &mut buckets[idx];
        bucket.count += 1;
        if let Some(intensity) = item.intensity.filter(|i| i.is_finite()) {
            bucket.intensities.push(intensity);
        }
        push_example(&mut bucket.triggers, item.trigger.as_deref());
        push_example(&mut bucket.contexts, item.context.as_deref());
    }

    let mut next_fallback = 0;
    buckets
        .into_iter()
        .map(|b| {
            let color = match emotion_color(&b.label) {
                Some(c) => c,
                None => {
                    let c = FALLBACK_PALETTE[next_fallback % FALLBACK_PALETTE.len()];
                    next_fallback += 1;
                    c
                }
            };
            let avg_intensity = if b.intensities.is_empty() {
                None
            } else {
                Some(b.intensities.iter().sum::<f64>() / b.intensities.len() as f64)
            };
            EmotionSummary {
                display_name: capitalize(&b.label),
                count: b.count,
                avg_intensity,
                triggers: b.triggers,
                contexts: b.contexts,
                color: color.to_string(),
                label: b.label,
            }
        })
        .collect()
}

/// Append a distinct, non-empty example while under the cap.
fn push_example(examples: &mut Vec<String>, value: Option<&str>) {
    let Some(value) = value.filter(|v| !v.is_empty()) else {
        return;
    };
    if examples.len() < MAX_EXAMPLES && !examples.iter().any(|e| e == value) {
        examples.push(value.to_string());
    }
}

fn capitalize(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EmotionItem;

    fn item(emotion: &str, intensity: Option<f64>, trigger: Option<&str>) -> EmotionItem {
        EmotionItem {
            emotion: Some(emotion.to_string()),
            trigger: trigger.map(str::to_string),
            context: None,
            intensity,
        }
    }

    fn content(items: Vec<EmotionItem>) -> PrimaryEmotionsContent {
        PrimaryEmotionsContent {
            primary_emotions: items,
        }
    }

    #[test]
    fn test_labels_normalized_and_filtered() {
        let contents = vec![
            content(vec![
                item("JOY", Some(8.0), None),
                item("optimism", Some(5.0), None),
            ]),
            content(vec![item("joy", Some(6.0), None), item("Fear", None, None)]),
        ];
        let groups = aggregate_emotions(&contents);
        assert_eq!(groups.len(), 2);

        assert_eq!(groups[0].label, "joy");
        assert_eq!(groups[0].display_name, "Joy");
        assert_eq!(groups[0].count, 2);
        assert_eq!(groups[0].avg_intensity, Some(7.0));
        assert_eq!(groups[0].color, "#A5E3D0");

        assert_eq!(groups[1].display_name, "Fear");
        assert_eq!(groups[1].avg_intensity, None);
        assert_eq!(groups[1].color, "#F59E0B");
    }

    #[test]
    fn test_triggers_deduplicated_and_capped() {
        let items = ["a", "b", "a", "c", "d", "e", "f"]
            .iter()
            .map(|t| item("sadness", None, Some(*t)))
            .collect();
        let groups = aggregate_emotions(&[content(items)]);
        assert_eq!(groups[0].triggers, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(groups[0].count, 7);
        assert!(groups[0].contexts.is_empty());
    }

    #[test]
    fn test_missing_labels_skipped() {
        let contents = vec![content(vec![EmotionItem {
            emotion: None,
            intensity: Some(3.0),
            ..Default::default()
        }])];
        assert!(aggregate_emotions(&contents).is_empty());
        assert!(aggregate_emotions(&[]).is_empty());
    }

    #[test]
    fn test_every_basic_emotion_has_a_color() {
        for label in BASIC_EMOTIONS {
            assert!(emotion_color(label).is_some(), "{} has no color", label);
        }
    }
}
