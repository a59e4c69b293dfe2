//! Builders for submission forms.

#![allow(dead_code)]

use storyteller::SubmissionForm;

/// Builder for `SubmissionForm` with a valid space story as the baseline.
pub struct FormBuilder {
    form: SubmissionForm,
}

impl FormBuilder {
    pub fn new() -> Self {
        let mut form = SubmissionForm::new("space", "5-8");
        form.characters = "Luna the fox".to_string();
        form.story_about = "finding a lost comet".to_string();
        Self { form }
    }

    pub fn theme(mut self, theme: &str) -> Self {
        self.form.theme = theme.to_string();
        self
    }

    pub fn age_range(mut self, age_range: &str) -> Self {
        self.form.age_range = age_range.to_string();
        self
    }

    pub fn length(mut self, length: &str) -> Self {
        self.form.length = length.to_string();
        self
    }

    pub fn language(mut self, language: &str) -> Self {
        self.form.language = language.to_string();
        self
    }

    pub fn lesson(mut self, lesson: &str) -> Self {
        self.form.lesson = Some(lesson.to_string());
        self
    }

    pub fn title(mut self, title: &str) -> Self {
        self.form.title = Some(title.to_string());
        self
    }

    pub fn model(mut self, model: &str) -> Self {
        self.form.ai_model = Some(model.to_string());
        self
    }

    pub fn audio(mut self) -> Self {
        self.form.enable_audio = true;
        self
    }

    pub fn private(mut self, private: bool) -> Self {
        self.form.is_private = Some(private);
        self
    }

    pub fn build(self) -> SubmissionForm {
        self.form
    }
}

impl Default for FormBuilder {
    fn default() -> Self {
        Self::new()
    }
}
