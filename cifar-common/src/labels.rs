//! CIFAR-10 class labels.

use serde::{Deserialize, Serialize};

/// Number of classes the classifier scores.
pub const NUM_CLASSES: usize = 10;

/// CIFAR-10 class labels, in the index order the model was trained with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassLabel {
    Airplane,
    Automobile,
    Bird,
    Cat,
    Deer,
    Dog,
    Frog,
    Horse,
    Ship,
    Truck,
}

impl ClassLabel {
    /// All labels in model output order.
    pub const ALL: [ClassLabel; NUM_CLASSES] = [
        ClassLabel::Airplane,
        ClassLabel::Automobile,
        ClassLabel::Bird,
        ClassLabel::Cat,
        ClassLabel::Deer,
        ClassLabel::Dog,
        ClassLabel::Frog,
        ClassLabel::Horse,
        ClassLabel::Ship,
        ClassLabel::Truck,
    ];

    /// Position of this label in the model's output vector.
    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ClassLabel::Airplane => "airplane",
            ClassLabel::Automobile => "automobile",
            ClassLabel::Bird => "bird",
            ClassLabel::Cat => "cat",
            ClassLabel::Deer => "deer",
            ClassLabel::Dog => "dog",
            ClassLabel::Frog => "frog",
            ClassLabel::Horse => "horse",
            ClassLabel::Ship => "ship",
            ClassLabel::Truck => "truck",
        }
    }
}

impl std::fmt::Display for ClassLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_order_matches_training() {
        let names: Vec<&str> = ClassLabel::ALL.iter().map(|l| l.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "airplane", "automobile", "bird", "cat", "deer", "dog", "frog", "horse", "ship",
                "truck"
            ]
        );
    }

    #[test]
    fn test_index_roundtrip() {
        for (i, label) in ClassLabel::ALL.iter().enumerate() {
            assert_eq!(label.index(), i);
            assert_eq!(ClassLabel::from_index(i), Some(*label));
        }
        assert_eq!(ClassLabel::from_index(NUM_CLASSES), None);
    }

    #[test]
    fn test_label_serialization() {
        let json = serde_json::to_string(&ClassLabel::Automobile).unwrap();
        assert_eq!(json, r#""automobile""#);
        assert_eq!(ClassLabel::Ship.to_string(), "ship");
    }
}
