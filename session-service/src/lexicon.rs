// Copyright (C) 2026 StarHuntingGames
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
};

use anyhow::Context;
use async_trait::async_trait;
use elias_common::{SessionId, Word, WordId, expand_env_vars};
use rand::seq::IndexedRandom;
use serde::Deserialize;

#[async_trait]
pub trait Lexicon: Send + Sync {
    /// A random word in `language`/`category` not yet dealt in this session.
    async fn random_unseen_word(
        &self,
        session_id: SessionId,
        language: &str,
        category: &str,
    ) -> anyhow::Result<Option<Word>>;

    /// Drops whatever is remembered about a finished session.
    async fn forget(&self, _session_id: SessionId) {}
}

#[derive(Debug, Deserialize)]
struct WordFile {
    words: Vec<Word>,
}

const BUILTIN_WORDS: &[(&str, &str)] = &[
    ("general", "umbrella"),
    ("general", "birthday"),
    ("general", "library"),
    ("general", "rainbow"),
    ("general", "telescope"),
    ("general", "passport"),
    ("general", "lighthouse"),
    ("general", "orchestra"),
    ("general", "snowman"),
    ("general", "volcano"),
    ("general", "backpack"),
    ("general", "fireworks"),
    ("general", "elevator"),
    ("general", "treasure"),
    ("general", "bicycle"),
    ("general", "pyramid"),
    ("general", "compass"),
    ("general", "hammock"),
    ("general", "magnet"),
    ("general", "parachute"),
    ("animals", "giraffe"),
    ("animals", "penguin"),
    ("animals", "kangaroo"),
    ("animals", "octopus"),
    ("animals", "hedgehog"),
    ("animals", "flamingo"),
    ("animals", "chameleon"),
    ("animals", "walrus"),
    ("food", "pancake"),
    ("food", "avocado"),
    ("food", "lasagna"),
    ("food", "popcorn"),
    ("food", "pretzel"),
    ("food", "dumpling"),
    ("food", "blueberry"),
    ("food", "omelette"),
];

/// Word list held in memory. Dealt word ids are remembered per session.
pub struct InMemoryLexicon {
    words: Vec<Word>,
    dealt: Mutex<HashMap<SessionId, HashSet<WordId>>>,
}

impl InMemoryLexicon {
    pub fn new(words: Vec<Word>) -> Self {
        Self {
            words,
            dealt: Mutex::new(HashMap::new()),
        }
    }

    pub fn builtin() -> Self {
        let words = BUILTIN_WORDS
            .iter()
            .zip(1..)
            .map(|((category, word), id)| Word {
                id,
                word: word.to_string(),
                lang: "en".to_string(),
                category: category.to_string(),
            })
            .collect();
        Self::new(words)
    }

    pub fn from_yaml_str(raw: &str) -> anyhow::Result<Self> {
        let file: WordFile = serde_yaml::from_str(raw).context("invalid word list yaml")?;
        let mut seen = HashSet::new();
        if let Some(duplicate) = file.words.iter().find(|word| !seen.insert(word.id)) {
            anyhow::bail!("duplicate word id {} in word list", duplicate.id);
        }
        Ok(Self::new(file.words))
    }

    pub fn load(path: &str) -> anyhow::Result<Self> {
        let path = expand_env_vars(path);
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read word list {path}"))?;
        Self::from_yaml_str(&raw)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }
}

#[async_trait]
impl Lexicon for InMemoryLexicon {
    async fn random_unseen_word(
        &self,
        session_id: SessionId,
        language: &str,
        category: &str,
    ) -> anyhow::Result<Option<Word>> {
        let mut dealt = self
            .dealt
            .lock()
            .map_err(|_| anyhow::anyhow!("lexicon state poisoned"))?;
        let seen = dealt.entry(session_id).or_default();
        let candidates: Vec<&Word> = self
            .words
            .iter()
            .filter(|word| word.lang == language && word.category == category)
            .filter(|word| !seen.contains(&word.id))
            .collect();

        let Some(word) = candidates.choose(&mut rand::rng()).map(|word| (*word).clone()) else {
            return Ok(None);
        };
        seen.insert(word.id);
        Ok(Some(word))
    }

    async fn forget(&self, session_id: SessionId) {
        if let Ok(mut dealt) = self.dealt.lock() {
            dealt.remove(&session_id);
        }
    }
}
