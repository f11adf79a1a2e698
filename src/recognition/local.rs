use async_trait::async_trait;

use crate::equals::EqualsConfig;
use crate::geometry::{classify_symbol, group_strokes, merge_equals_bars, AnalyzerConfig};
use crate::models::Stroke;

use super::error::RecognitionError;
use super::recognizer::{RecognizeOptions, Recognizer, RecognizerOutput};

/// Offline recognizer built on the stroke geometry heuristics. Cheap enough
/// to run on every detection and never fails.
#[derive(Debug, Clone, Default)]
pub struct GeometricRecognizer {
    config: AnalyzerConfig,
}

impl GeometricRecognizer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    /// Synchronous core of [`Recognizer::recognize`].
    pub fn recognize_strokes(&self, strokes: &[Stroke]) -> RecognizerOutput {
        let groups = merge_equals_bars(
            group_strokes(strokes, self.config.symbol_group_distance),
            &EqualsConfig::default(),
            self.config.equals_max_gap_ratio,
        );
        if groups.is_empty() {
            return RecognizerOutput::success("", 0.0);
        }

        let guesses: Vec<_> = groups
            .iter()
            .map(|group| classify_symbol(group, &self.config))
            .collect();

        let mut latex = String::new();
        let mut after_command = false;
        for guess in guesses.iter().filter(|g| !g.is_unknown()) {
            // A control word swallows following letters without a separator.
            if after_command {
                latex.push(' ');
            }
            latex.push_str(&guess.symbol);
            after_command = guess.symbol.starts_with('\\');
        }

        if latex.is_empty() {
            return RecognizerOutput::success("", 0.0);
        }

        let confidence =
            guesses.iter().map(|g| g.confidence).sum::<f64>() / guesses.len() as f64;
        RecognizerOutput::success(latex, confidence)
    }
}

#[async_trait]
impl Recognizer for GeometricRecognizer {
    fn id(&self) -> &str {
        "geometric"
    }

    async fn recognize(
        &self,
        strokes: &[Stroke],
        _options: &RecognizeOptions,
    ) -> Result<RecognizerOutput, RecognitionError> {
        Ok(self.recognize_strokes(strokes))
    }
}
