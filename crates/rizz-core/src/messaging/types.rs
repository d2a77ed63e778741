/// Outgoing "chat action" (typing indicator, etc).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatAction {
    Typing,
    RecordVoice,
    UploadPhoto,
}

/// Inline keyboard, laid out row by row.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<InlineButton>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn new(label: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            callback_data: callback_data.into(),
        }
    }
}

impl InlineKeyboard {
    pub fn new(rows: Vec<Vec<InlineButton>>) -> Self {
        Self { rows }
    }

    /// Convenience for "one button per row" layouts.
    pub fn one_per_row(buttons: Vec<InlineButton>) -> Self {
        Self {
            rows: buttons.into_iter().map(|b| vec![b]).collect(),
        }
    }

    /// Lay `buttons` out `per_row` at a time; the last row may be shorter.
    pub fn grid(buttons: Vec<InlineButton>, per_row: usize) -> Self {
        let per_row = per_row.max(1);
        let mut rows = Vec::new();
        let mut row = Vec::with_capacity(per_row);
        for b in buttons {
            row.push(b);
            if row.len() == per_row {
                rows.push(std::mem::take(&mut row));
            }
        }
        if !row.is_empty() {
            rows.push(row);
        }
        Self { rows }
    }

    pub fn buttons(&self) -> impl Iterator<Item = &InlineButton> {
        self.rows.iter().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_wraps_rows() {
        let buttons = (0..5)
            .map(|i| InlineButton::new(format!("b{i}"), format!("cb_{i}")))
            .collect();
        let kb = InlineKeyboard::grid(buttons, 2);
        let widths: Vec<usize> = kb.rows.iter().map(Vec::len).collect();
        assert_eq!(widths, vec![2, 2, 1]);
        assert_eq!(kb.buttons().count(), 5);
    }

    #[test]
    fn one_per_row_keeps_order() {
        let kb = InlineKeyboard::one_per_row(vec![
            InlineButton::new("English", "set_language_en"),
            InlineButton::new("Français", "set_language_fr"),
        ]);
        assert_eq!(kb.rows.len(), 2);
        assert_eq!(kb.rows[1][0].callback_data, "set_language_fr");
    }
}
