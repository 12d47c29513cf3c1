use crate::core::error::ValidationError;
use crate::models::{ActionKind, ImageTemplate, MacroSequence};

/// Checks a sequence against the known templates before execution.
/// Returns every problem found so the caller can report a complete list.
pub fn validate(sequence: &MacroSequence, templates: &[ImageTemplate]) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if !sequence.enabled {
        errors.push(ValidationError::SequenceDisabled);
    }

    if !sequence.infinite_loop && sequence.loop_count < 1 {
        errors.push(ValidationError::InvalidLoopCount {
            loop_count: sequence.loop_count,
        });
    }

    check_ordering(sequence, &mut errors);

    let mut referenced_templates: Vec<&str> = Vec::new();
    for action in &sequence.actions {
        match &action.kind {
            ActionKind::FindImage {
                image_template_id,
                match_threshold,
            } => {
                check_template_ref(&action.id, image_template_id, templates, &mut errors);
                referenced_templates.push(image_template_id);
                if let Some(value) = match_threshold {
                    if !(0.0..=1.0).contains(value) || !value.is_finite() {
                        errors.push(ValidationError::ThresholdOutOfRange {
                            action_id: action.id.clone(),
                            value: *value,
                        });
                    }
                }
            }
            ActionKind::Click {
                click_position,
                image_template_id,
            }
            | ActionKind::DoubleClick {
                click_position,
                image_template_id,
            }
            | ActionKind::RightClick {
                click_position,
                image_template_id,
            } => {
                if let Some(template_id) = image_template_id {
                    check_template_ref(&action.id, template_id, templates, &mut errors);
                    referenced_templates.push(template_id);
                } else if click_position.is_none() {
                    errors.push(ValidationError::MissingClickTarget {
                        action_id: action.id.clone(),
                    });
                }
            }
            ActionKind::Drag {
                click_position,
                drag_to_position,
            } => {
                if click_position.is_none() || drag_to_position.is_none() {
                    errors.push(ValidationError::MissingDragEndpoints {
                        action_id: action.id.clone(),
                    });
                }
            }
            ActionKind::KeyPress { key_combination } => {
                if key_combination.is_empty() {
                    errors.push(ValidationError::EmptyKeyCombination {
                        action_id: action.id.clone(),
                    });
                }
            }
            ActionKind::Wait { wait_seconds } => {
                if !wait_seconds.is_finite() || *wait_seconds < 0.0 {
                    errors.push(ValidationError::InvalidWaitDuration {
                        action_id: action.id.clone(),
                        seconds: *wait_seconds,
                    });
                }
            }
            ActionKind::TypeText { .. }
            | ActionKind::Scroll { .. }
            | ActionKind::SendTelegram { .. } => {}
        }
    }

    // Range-check the templates this sequence actually uses.
    for template in templates {
        if referenced_templates.iter().any(|id| *id == template.id)
            && (!(0.0..=1.0).contains(&template.threshold) || !template.threshold.is_finite())
        {
            errors.push(ValidationError::TemplateThresholdOutOfRange {
                template_id: template.id.clone(),
                value: template.threshold,
            });
        }
    }

    errors
}

fn check_ordering(sequence: &MacroSequence, errors: &mut Vec<ValidationError>) {
    let mut indices: Vec<u32> = sequence.actions.iter().map(|a| a.index).collect();
    indices.sort_unstable();

    let mut seen_duplicate = false;
    for pair in indices.windows(2) {
        if pair[0] == pair[1] && !seen_duplicate {
            errors.push(ValidationError::DuplicateIndex { index: pair[0] });
            seen_duplicate = true;
        }
    }

    let dense: Vec<u32> = (0..sequence.actions.len() as u32).collect();
    if !seen_duplicate && indices != dense {
        errors.push(ValidationError::IndicesNotDense {
            expected: sequence.actions.len() as u32,
            found: indices,
        });
    }
}

fn check_template_ref(
    action_id: &str,
    template_id: &str,
    templates: &[ImageTemplate],
    errors: &mut Vec<ValidationError>,
) {
    if !templates.iter().any(|t| t.id == template_id) {
        errors.push(ValidationError::UnknownTemplate {
            action_id: action_id.to_string(),
            template_id: template_id.to_string(),
        });
    }
}
