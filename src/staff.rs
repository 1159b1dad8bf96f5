// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
// Treble staff placement for trainer targets.

use crate::pitch::NoteName;

const LETTERS: [char; 7] = ['C', 'D', 'E', 'F', 'G', 'A', 'B'];

/// Bottom and top lines of the treble staff, in steps above E4.
const BOTTOM_LINE: i32 = 0;
const TOP_LINE: i32 = 8;

const WIDTH: usize = 25;
const NOTE_COLUMN: usize = 12;

/// Returns the staff position of a note as diatonic steps above the bottom
/// line (E4). Even positions sit on a line, odd positions in a space. Sharps
/// share the position of their natural.
pub fn position(note: &NoteName) -> i32 {
    let letter = note.pitch_class().chars().next().unwrap_or('C');
    let index = LETTERS.iter().position(|l| *l == letter).unwrap_or(0) as i32;
    note.octave() * 7 + index - (4 * 7 + 2)
}

/// Returns the ledger line positions needed to draw the note.
pub fn ledger_lines(note: &NoteName) -> Vec<i32> {
    let pos = position(note);
    if pos < BOTTOM_LINE {
        (pos..BOTTOM_LINE).filter(|p| p % 2 == 0).collect()
    } else if pos > TOP_LINE {
        (TOP_LINE + 1..=pos).filter(|p| p % 2 == 0).collect()
    } else {
        Vec::new()
    }
}

/// Draws the note on a treble staff, top line first.
pub fn render(note: &NoteName) -> String {
    let pos = position(note);
    let ledgers = ledger_lines(note);
    let top = pos.max(TOP_LINE);
    let bottom = pos.min(BOTTOM_LINE);

    let mut rows = Vec::new();
    for row in (bottom..=top).rev() {
        let mut line: Vec<char> = if row % 2 != 0 {
            vec![' '; WIDTH]
        } else if (BOTTOM_LINE..=TOP_LINE).contains(&row) {
            vec!['-'; WIDTH]
        } else if ledgers.contains(&row) {
            let mut line = vec![' '; WIDTH];
            line[NOTE_COLUMN - 2..=NOTE_COLUMN + 2].fill('-');
            line
        } else {
            vec![' '; WIDTH]
        };

        if row == pos {
            line[NOTE_COLUMN] = 'O';
        }
        let text: String = line.into_iter().collect();
        let text = text.trim_end();
        if row == pos {
            rows.push(format!("{}  {}", text, note));
        } else {
            rows.push(text.to_string());
        }
    }
    rows.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::pitch::{self, NOTE_POOL};

    fn note(name: &str) -> NoteName {
        name.parse().unwrap()
    }

    #[test]
    fn test_pool_positions() {
        let positions: Vec<i32> = pitch::note_pool().iter().map(position).collect();
        assert_eq!(vec![-2, -1, 0, 1, 2, 3, 4, 5], positions);
        assert_eq!(position(&note("C4")), position(&note("C#4")));
        assert_eq!(10, position(&note("A5")));
    }

    #[test]
    fn test_ledger_lines() {
        assert_eq!(vec![-2], ledger_lines(&note("C4")));
        assert!(ledger_lines(&note("D4")).is_empty());
        assert!(ledger_lines(&note("C5")).is_empty());
        assert_eq!(vec![-4, -2], ledger_lines(&note("A3")));
        assert_eq!(vec![10], ledger_lines(&note("A5")));
    }

    #[test]
    fn test_render_middle_c() {
        let rendered = render(&note("C4"));
        let rows: Vec<&str> = rendered.lines().collect();
        assert_eq!(11, rows.len());
        assert_eq!("-".repeat(WIDTH), rows[0]);
        assert_eq!("-".repeat(WIDTH), rows[8]);
        assert_eq!("", rows[9]);
        assert_eq!("          --O--  C4", rows[10]);
    }

    #[test]
    fn test_render_is_deterministic() {
        for name in NOTE_POOL {
            let note = note(name);
            let rendered = render(&note);
            assert_eq!(rendered, render(&note));
            assert_eq!(1, rendered.matches('O').count());
            assert!(rendered.contains(name));
        }
    }

    #[test]
    fn test_render_space_note() {
        let rendered = render(&note("F4"));
        let rows: Vec<&str> = rendered.lines().collect();
        assert_eq!(9, rows.len());
        assert_eq!("            O  F4", rows[7]);
    }
}
