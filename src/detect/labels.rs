use std::path::Path;

use anyhow::{anyhow, Context, Result};

/// COCO class names in model output order, used when no labels file is
/// configured. Matches the 80-class detection models this crate ships
/// against.
const COCO_NAMES: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorbike",
    "aeroplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "sofa",
    "pottedplant",
    "bed",
    "diningtable",
    "toilet",
    "tvmonitor",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

pub fn coco_labels() -> Vec<String> {
    COCO_NAMES.iter().map(|name| name.to_string()).collect()
}

/// Load class labels from a file, one name per line. Blank lines and
/// leading/trailing whitespace are ignored.
pub fn load_labels(path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read labels file {}", path.display()))?;
    let labels: Vec<String> = raw
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .map(|line| line.to_string())
        .collect();
    if labels.is_empty() {
        return Err(anyhow!("labels file {} contains no labels", path.display()));
    }
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn coco_table_has_eighty_classes() {
        let labels = coco_labels();
        assert_eq!(labels.len(), 80);
        assert_eq!(labels[0], "person");
        assert_eq!(labels[41], "cup");
    }

    #[test]
    fn loads_labels_file_skipping_blanks() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "person\n\n  car  \ndog").unwrap();
        let labels = load_labels(file.path()).unwrap();
        assert_eq!(labels, vec!["person", "car", "dog"]);
    }

    #[test]
    fn empty_labels_file_is_an_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(load_labels(file.path()).is_err());
    }
}
