pub mod extract;
pub mod html;

pub use extract::{extract_metadata, title_from_filename, ArtifactMetadata};
pub use html::{artifact_stem, paragraphs, render_story, slugify, StoryArtifact};
