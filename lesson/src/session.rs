use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::image::LessonImage;
use crate::transcript::Transcript;

/// Per-learner state: transcript, active image and declared on-screen objects.
///
/// A session is created when a learner opens the page and dropped when they
/// leave. Nothing here outlives the process.
#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    transcript: Transcript,
    image: Option<LessonImage>,
    objects: Vec<String>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            transcript: Transcript::new(),
            image: None,
            objects: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn transcript_mut(&mut self) -> &mut Transcript {
        &mut self.transcript
    }

    pub fn image(&self) -> Option<&LessonImage> {
        self.image.as_ref()
    }

    pub fn objects(&self) -> &[String] {
        &self.objects
    }

    /// Replace the active image. The transcript is cleared first so the next
    /// turn always starts a fresh lesson.
    pub fn load_image(&mut self, image: LessonImage) {
        self.transcript.clear();
        debug!(session = %self.id, name = image.name(), bytes = image.len(), "image loaded");
        self.image = Some(image);
    }

    /// Declare an object visible on screen. Blank labels are ignored; any
    /// other label is kept exactly as given.
    pub fn add_object(&mut self, label: &str) -> bool {
        if label.trim().is_empty() {
            return false;
        }
        self.objects.push(label.to_string());
        true
    }

    pub fn clear_objects(&mut self) {
        self.objects.clear();
    }

    /// Drop the conversation but keep the image and objects.
    pub fn reset(&mut self) {
        self.transcript.clear();
    }

    /// Serializable view handed to the browser. The image is described by
    /// name and type only.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.view(false)
    }

    /// Like [`Session::snapshot`] but with the image inlined as a data URL.
    pub fn snapshot_with_image(&self) -> SessionSnapshot {
        self.view(true)
    }

    fn view(&self, inline_image: bool) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            transcript: self.transcript.clone(),
            objects: self.objects.clone(),
            image: self.image.as_ref().map(|i| ImageSummary {
                name: i.name().to_string(),
                mime: i.mime().to_string(),
                data_url: inline_image.then(|| i.data_url()),
            }),
        }
    }
}

/// JSON shape of a [`Session`].
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub transcript: Transcript,
    pub objects: Vec<String>,
    pub image: Option<ImageSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageSummary {
    pub name: String,
    pub mime: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn objects_keep_accepted_inputs_in_order() {
        let mut s = Session::new();
        let inputs = ["apple", "", "  ", "orange", " pear "];
        let accepted: Vec<bool> = inputs.iter().map(|i| s.add_object(i)).collect();
        assert_eq!(accepted, vec![true, false, false, true, true]);
        assert_eq!(s.objects(), ["apple", "orange", " pear "]);
    }

    #[test]
    fn accepted_label_is_stored_verbatim() {
        let mut s = Session::new();
        assert!(s.add_object("  red apple "));
        assert_eq!(s.objects(), ["  red apple "]);
    }

    #[test]
    fn loading_image_resets_transcript() {
        let mut s = Session::new();
        s.transcript_mut().push_user("old");
        s.load_image(LessonImage::new("fruit.jpg", None, vec![1, 2, 3]));
        assert!(s.transcript().is_empty());
        assert_eq!(s.image().unwrap().name(), "fruit.jpg");
    }

    #[test]
    fn only_full_snapshot_inlines_image() {
        let mut s = Session::new();
        s.load_image(LessonImage::new("a.png", Some("image/png"), vec![1, 2]));
        let light = s.snapshot().image.unwrap();
        assert_eq!(light.name, "a.png");
        assert!(light.data_url.is_none());
        let full = s.snapshot_with_image().image.unwrap();
        assert_eq!(full.data_url.as_deref(), Some("data:image/png;base64,AQI="));
    }

    #[test]
    fn reset_keeps_image_and_objects() {
        let mut s = Session::new();
        s.add_object("apple");
        s.load_image(LessonImage::new("a.png", None, vec![0]));
        s.transcript_mut().push_assistant("q");
        s.reset();
        assert!(s.transcript().is_empty());
        assert!(s.image().is_some());
        assert_eq!(s.objects().len(), 1);
    }
}
