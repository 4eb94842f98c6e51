//! Request body construction for Qwen image-edit predictions.
//!
//! Turns a provider-neutral [`JobRequest`] into the `input` object of a
//! Replicate creation call.

use muse_core::job::{ExecutionMode, JobRequest, ParamValue, IMAGE_SLOT_KEYS};
use serde_json::{Map, Value};

/// Multi-image edit model (up to three inputs).
pub const QWEN_IMAGE_EDIT_PLUS: &str = "qwen/qwen-image-edit-plus";
/// Multi-image edit model with custom LoRA support.
pub const QWEN_IMAGE_EDIT_PLUS_LORA: &str = "qwen/qwen-image-edit-plus-lora";
/// Original single-image edit model.
pub const QWEN_IMAGE_EDIT: &str = "qwen/qwen-image-edit";

/// Models whose image inputs are declared as URI arrays rather than
/// single URIs.
const ARRAY_IMAGE_MODELS: &[&str] = &[QWEN_IMAGE_EDIT_PLUS, QWEN_IMAGE_EDIT_PLUS_LORA];

/// Whether `model` expects each image slot wrapped in a one-element array.
pub fn wraps_images_in_arrays(model: &str) -> bool {
    ARRAY_IMAGE_MODELS.contains(&model)
}

/// Build the prediction `input` object for a request.
///
/// Sets `prompt` and `go_fast` (from the execution mode), copies caller
/// parameters, then fills `image`, `image_2`, `image_3` in slot order.
/// Inline images become base64 data URIs; URLs pass through untouched.
pub fn build_input(request: &JobRequest) -> Value {
    let mut input = Map::new();
    input.insert("prompt".into(), Value::String(request.prompt().to_string()));
    input.insert(
        "go_fast".into(),
        Value::Bool(request.mode() == ExecutionMode::Fast),
    );

    for (name, value) in request.params() {
        input.insert(name.clone(), param_to_json(value));
    }

    let as_array = wraps_images_in_arrays(request.model());
    for (key, image) in IMAGE_SLOT_KEYS.iter().zip(request.images()) {
        let wire = Value::String(image.to_wire());
        let value = if as_array {
            Value::Array(vec![wire])
        } else {
            wire
        };
        input.insert((*key).to_string(), value);
    }

    Value::Object(input)
}

fn param_to_json(value: &ParamValue) -> Value {
    match value {
        ParamValue::Bool(b) => Value::Bool(*b),
        ParamValue::Int(i) => Value::from(*i),
        ParamValue::Float(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ParamValue::Text(s) => Value::String(s.clone()),
    }
}

#[cfg(test)]
mod tests {
    use muse_core::job::ImageRef;
    use serde_json::json;

    use super::*;

    const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn builds_single_uri_slots_for_original_model() {
        let request = JobRequest::new(QWEN_IMAGE_EDIT, "make it vintage")
            .with_image(ImageRef::inline(PNG.to_vec()))
            .with_param("output_format", "png")
            .with_param("output_quality", 95u32);

        let input = build_input(&request);
        assert_eq!(input["prompt"], "make it vintage");
        assert_eq!(input["go_fast"], true);
        assert_eq!(input["output_format"], "png");
        assert_eq!(input["output_quality"], 95);
        assert_eq!(input["image"], "data:image/png;base64,iVBORw0KGgo=");
        assert!(input.get("image_2").is_none());
    }

    #[test]
    fn plus_models_wrap_slots_in_arrays_and_keep_order() {
        let request = JobRequest::new(QWEN_IMAGE_EDIT_PLUS, "place the chair")
            .with_mode(ExecutionMode::HighFidelity)
            .with_image(ImageRef::url("https://x/room.jpg"))
            .with_image(ImageRef::url("https://x/chair.jpg"))
            .with_image(ImageRef::inline(vec![0xFF, 0xD8, 0xFF]));

        let input = build_input(&request);
        assert_eq!(input["go_fast"], false);
        assert_eq!(input["image"], json!(["https://x/room.jpg"]));
        assert_eq!(input["image_2"], json!(["https://x/chair.jpg"]));
        assert_eq!(input["image_3"], json!(["data:image/jpeg;base64,/9j/"]));
    }

    #[test]
    fn numeric_and_bool_params_keep_types() {
        let request = JobRequest::new(QWEN_IMAGE_EDIT, "x")
            .with_image(ImageRef::url("https://x/a.png"))
            .with_param("seed", 42i64)
            .with_param("disable_safety_checker", false)
            .with_param("guidance", 2.5);

        let input = build_input(&request);
        assert_eq!(input["seed"], 42);
        assert_eq!(input["disable_safety_checker"], false);
        assert_eq!(input["guidance"], 2.5);
    }

    #[test]
    fn array_wrapping_is_model_specific() {
        assert!(wraps_images_in_arrays(QWEN_IMAGE_EDIT_PLUS));
        assert!(wraps_images_in_arrays(QWEN_IMAGE_EDIT_PLUS_LORA));
        assert!(!wraps_images_in_arrays(QWEN_IMAGE_EDIT));
    }
}
