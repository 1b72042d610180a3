use crate::models::ScanResult;
use crate::services::frame_source::Frame;
use crate::services::ScanError;
use image::GrayImage;
use std::sync::Arc;

/// External QR reading capability.
///
/// Implementations return every payload they could read, as raw bytes, in
/// their own order.
#[cfg_attr(test, mockall::automock)]
pub trait QrDecoder: Send + Sync {
    fn decode_candidates(&self, image: GrayImage) -> Result<Vec<Vec<u8>>, ScanError>;
}

/// [`QrDecoder`] backed by `rqrr`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RqrrDecoder;

impl QrDecoder for RqrrDecoder {
    fn decode_candidates(&self, image: GrayImage) -> Result<Vec<Vec<u8>>, ScanError> {
        let mut prepared = rqrr::PreparedImage::prepare(image);
        let grids = prepared.detect_grids();

        let mut payloads = Vec::with_capacity(grids.len());
        let mut last_error = None;

        for (i, grid) in grids.iter().enumerate() {
            let mut bytes = Vec::new();
            match grid.decode_to(&mut bytes) {
                Ok(_metadata) => payloads.push(bytes),
                Err(e) => {
                    tracing::warn!("QR code {} could not be decoded: {:?}", i + 1, e);
                    last_error = Some(e);
                }
            }
        }

        // Codes were found but none of them was readable
        if payloads.is_empty() {
            if let Some(e) = last_error {
                return Err(ScanError::Decode(format!("{:?}", e)));
            }
        }

        Ok(payloads)
    }
}

/// Turns one frame into zero or one text payloads.
///
/// Only the decoder's first candidate is kept, even when a frame shows
/// several codes.
#[derive(Clone)]
pub struct DecodePipeline {
    decoder: Arc<dyn QrDecoder>,
}

impl DecodePipeline {
    pub fn new(decoder: Arc<dyn QrDecoder>) -> Self {
        Self { decoder }
    }

    /// Decode `frame`.
    ///
    /// # Errors
    ///
    /// - [`ScanError::Decode`] if the decoder failed
    /// - [`ScanError::InvalidEncoding`] if the first payload is not UTF-8
    pub fn decode(&self, frame: &Frame) -> Result<ScanResult, ScanError> {
        let candidates = self.decoder.decode_candidates(frame.to_luma8())?;

        if candidates.len() > 1 {
            tracing::debug!("{} QR codes found, keeping the first", candidates.len());
        }

        match candidates.into_iter().next() {
            Some(bytes) => {
                let text = String::from_utf8(bytes).map_err(|e| e.utf8_error())?;
                Ok(ScanResult::found(text))
            }
            None => Ok(ScanResult::not_found()),
        }
    }
}

impl Default for DecodePipeline {
    fn default() -> Self {
        Self::new(Arc::new(RqrrDecoder))
    }
}

impl std::fmt::Debug for DecodePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodePipeline").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Luma};

    fn blank_frame() -> Frame {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(64, 64, Luma([255])))
    }

    fn pipeline_returning(candidates: Vec<Vec<u8>>) -> DecodePipeline {
        let mut decoder = MockQrDecoder::new();
        decoder
            .expect_decode_candidates()
            .times(1)
            .return_once(move |_| Ok(candidates));
        DecodePipeline::new(Arc::new(decoder))
    }

    #[test]
    fn test_single_payload() {
        let pipeline = pipeline_returning(vec![b"https://example.com".to_vec()]);
        let result = pipeline.decode(&blank_frame()).unwrap();

        assert_eq!(result, ScanResult::found("https://example.com"));
    }

    #[test]
    fn test_no_payload() {
        let pipeline = pipeline_returning(Vec::new());
        let result = pipeline.decode(&blank_frame()).unwrap();

        assert!(!result.found);
        assert!(result.payload.is_none());
    }

    #[test]
    fn test_keeps_first_of_many() {
        let pipeline = pipeline_returning(vec![b"first".to_vec(), b"second".to_vec()]);
        let result = pipeline.decode(&blank_frame()).unwrap();

        assert_eq!(result.payload.as_deref(), Some("first"));
    }

    #[test]
    fn test_invalid_utf8() {
        let pipeline = pipeline_returning(vec![vec![0x66, 0x6f, 0xff]]);
        let err = pipeline.decode(&blank_frame()).unwrap_err();

        assert!(matches!(err, ScanError::InvalidEncoding(_)));
    }

    #[test]
    fn test_decoder_error_propagates() {
        let mut decoder = MockQrDecoder::new();
        decoder
            .expect_decode_candidates()
            .returning(|_| Err(ScanError::Decode("damaged".to_string())));
        let pipeline = DecodePipeline::new(Arc::new(decoder));

        let err = pipeline.decode(&blank_frame()).unwrap_err();
        assert_eq!(err, ScanError::Decode("damaged".to_string()));
    }

    #[test]
    fn test_decoder_receives_luma_frame_of_same_size() {
        let mut decoder = MockQrDecoder::new();
        decoder
            .expect_decode_candidates()
            .withf(|image| image.width() == 64 && image.height() == 64)
            .returning(|_| Ok(Vec::new()));
        let pipeline = DecodePipeline::new(Arc::new(decoder));

        pipeline.decode(&blank_frame()).unwrap();
    }

    #[test]
    fn test_rqrr_blank_image_has_no_codes() {
        let result = DecodePipeline::default().decode(&blank_frame()).unwrap();
        assert!(!result.found);
    }
}
