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

use std::collections::HashSet;

use rand::Rng;

const ADJECTIVES: [&str; 16] = [
    "Brave", "Clever", "Swift", "Quiet", "Lucky", "Mighty", "Sneaky", "Jolly", "Bold", "Wild",
    "Sunny", "Fuzzy", "Rapid", "Cosmic", "Golden", "Stormy",
];

const NOUNS: [&str; 16] = [
    "Foxes", "Owls", "Otters", "Wolves", "Pandas", "Hawks", "Badgers", "Lynxes", "Ravens",
    "Beavers", "Tigers", "Dolphins", "Falcons", "Moose", "Geckos", "Yaks",
];

/// A random "Adjective Noun" team name.
pub fn generate_team_name() -> String {
    let mut rng = rand::rng();
    let adjective = ADJECTIVES[rng.random_range(0..ADJECTIVES.len())];
    let noun = NOUNS[rng.random_range(0..NOUNS.len())];
    format!("{adjective} {noun}")
}

/// `count` distinct team names. Nouns are never repeated so names stay easy
/// to tell apart on a small screen.
pub fn generate_unique_team_names(count: usize) -> Vec<String> {
    let count = count.min(NOUNS.len());
    let mut rng = rand::rng();
    let mut used_nouns = HashSet::new();
    let mut names = Vec::with_capacity(count);

    while names.len() < count {
        let noun = NOUNS[rng.random_range(0..NOUNS.len())];
        if !used_nouns.insert(noun) {
            continue;
        }
        let adjective = ADJECTIVES[rng.random_range(0..ADJECTIVES.len())];
        names.push(format!("{adjective} {noun}"));
    }

    names
}
