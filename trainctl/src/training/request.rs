//! Construction of the payload sent to the training service.

use serde::Serialize;

use crate::config::{StorageConfig, TrainerConfig};
use crate::db::models::projects::Project;

/// A training job as submitted to `POST /v1/trainings`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingRequest {
    pub input: TrainingInput,
    /// Destination model, `{owner}/{project_id}`
    pub model: String,
    /// Called by the training service when the job reaches a terminal state
    pub webhook_completed: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingInput {
    pub instance_prompt: String,
    pub class_prompt: String,
    /// URL of the zip archive with the user's photos
    pub instance_data: String,
    pub max_train_steps: u32,
    pub num_class_images: u32,
    pub learning_rate: f64,
}

/// Build the training request for `project`, using an already-normalised instance class.
///
/// Pure: the training data location is derived, not checked for existence.
pub fn build_training_request(
    project: &Project,
    instance_class: &str,
    trainer: &TrainerConfig,
    storage: &StorageConfig,
    callback_url: &str,
) -> TrainingRequest {
    let instance_data = format!(
        "{}/{}.zip",
        storage.training_data_base_url.as_str().trim_end_matches('/'),
        project.id
    );

    TrainingRequest {
        input: TrainingInput {
            instance_prompt: format!("a photo of a {} {}", trainer.instance_token, instance_class),
            class_prompt: format!("a photo of a {instance_class}"),
            instance_data,
            max_train_steps: trainer.max_train_steps,
            num_class_images: trainer.num_class_images,
            learning_rate: trainer.learning_rate,
        },
        model: format!("{}/{}", trainer.model_owner, project.id),
        webhook_completed: callback_url.to_string(),
    }
}
