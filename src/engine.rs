//! Core game engine: a pure-ish step function over two snakes on a grid.
//!
//! `Game::step` advances exactly one tick following spec.md §4.1: input
//! commit, predicted head, fruit effects & movement, collision detection,
//! termination & tiebreak, then fruit lifecycle (every tick, even terminal).

use crate::constants;
use crate::types::{Direction, Fruit, FruitConfig, FruitType, Position, Snake};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::HashMap;
use utoipa::ToSchema;

/// Static game rules, shared by every arena of a competition.
#[derive(Debug, Clone)]
pub struct GameConfig {
    pub grid_width: i32,
    pub grid_height: i32,
    pub max_fruits: usize,
    pub fruit_interval: u32,
    pub fruit_warning: u32,
    pub fruits: HashMap<FruitType, FruitConfig>,
    pub max_input_queue: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        let mut fruits = HashMap::new();
        fruits.insert(
            FruitType::Apple,
            FruitConfig {
                propensity: 1.0,
                lifetime: None,
            },
        );
        fruits.insert(
            FruitType::Grapes,
            FruitConfig {
                propensity: 0.3,
                lifetime: Some(60),
            },
        );
        for kind in FruitType::ALL {
            fruits.entry(kind).or_insert(FruitConfig::default());
        }
        Self {
            grid_width: constants::GRID_WIDTH,
            grid_height: constants::GRID_HEIGHT,
            max_fruits: constants::MAX_FRUITS,
            fruit_interval: constants::FRUIT_INTERVAL_TICKS,
            fruit_warning: constants::FRUIT_WARNING_TICKS,
            fruits,
            max_input_queue: constants::MAX_INPUT_QUEUE,
        }
    }
}

/// The live state of one arena's game.
#[derive(Debug)]
pub struct Game {
    pub snakes: HashMap<u8, Snake>,
    pub foods: Vec<Fruit>,
    pub running: bool,
    pub winner: Option<u8>,
    pub ticks_since_last_fruit: u32,
    rng: StdRng,
}

impl Game {
    pub fn new(config: &GameConfig) -> Self {
        let mut snakes = HashMap::new();
        snakes.insert(
            1,
            Snake::new(
                1,
                Position::new(5, config.grid_height / 2),
                Direction::Right,
            ),
        );
        snakes.insert(
            2,
            Snake::new(
                2,
                Position::new(config.grid_width - 6, config.grid_height / 2 + 1),
                Direction::Left,
            ),
        );
        Self {
            snakes,
            foods: Vec::new(),
            running: true,
            winner: None,
            ticks_since_last_fruit: config.fruit_interval,
            rng: StdRng::from_entropy(),
        }
    }

    #[cfg(test)]
    pub fn new_seeded(config: &GameConfig, seed: u64) -> Self {
        let mut game = Self::new(config);
        game.rng = StdRng::seed_from_u64(seed);
        game
    }

    /// Queue a direction change for the given slot's snake (gateway entry
    /// point for `move` messages).
    pub fn queue_direction(&mut self, slot: u8, direction: Direction, config: &GameConfig) {
        if let Some(snake) = self.snakes.get_mut(&slot) {
            snake.queue_direction(direction, config.max_input_queue);
        }
    }

    /// Advance exactly one tick. Total over valid state: always leaves
    /// `running` false with `winner` set, or `running` true.
    pub fn step(&mut self, config: &GameConfig) {
        if !self.running {
            return;
        }

        // 1. Input commit.
        for snake in self.snakes.values_mut() {
            if !snake.alive {
                continue;
            }
            let before = snake.next_direction;
            if let Some(popped) = snake.input_queue.pop_front() {
                if popped != snake.direction.opposite() {
                    snake.next_direction = popped;
                }
            }
            snake.changed_direction_last_move = snake.next_direction != before;
        }

        // 2. Predicted heads.
        let old_heads: HashMap<u8, Position> = self
            .snakes
            .iter()
            .filter(|(_, s)| s.alive)
            .map(|(&slot, s)| (slot, s.head()))
            .collect();
        let predicted_heads: HashMap<u8, Position> = self
            .snakes
            .iter()
            .filter(|(_, s)| s.alive)
            .map(|(&slot, s)| (slot, s.head().translated(s.next_direction)))
            .collect();

        // 3. Fruit effects & movement.
        let mut eaten_indices = Vec::new();
        let mut grows: HashMap<u8, bool> = HashMap::new();
        let mut shrink_others: HashMap<u8, u8> = HashMap::new();
        for (&slot, &new_head) in &predicted_heads {
            let mut grow = false;
            if let Some((idx, fruit)) = self
                .foods
                .iter()
                .enumerate()
                .find(|(_, f)| f.position() == new_head)
            {
                match fruit.kind {
                    FruitType::Apple => grow = true,
                    FruitType::Grapes => {
                        grow = true;
                        shrink_others.insert(slot, slot);
                    }
                    _ => {}
                }
                eaten_indices.push(idx);
            }
            grows.insert(slot, grow);
        }
        eaten_indices.sort_unstable();
        eaten_indices.dedup();
        for idx in eaten_indices.into_iter().rev() {
            self.foods.remove(idx);
        }
        // Grapes shrinks every *other* snake's tail by one, floor length 1.
        for &eater in shrink_others.keys() {
            for (&slot, snake) in self.snakes.iter_mut() {
                if slot != eater && snake.alive && snake.len() > 1 {
                    snake.body.pop_back();
                }
            }
        }
        for (&slot, &new_head) in &predicted_heads {
            if let Some(snake) = self.snakes.get_mut(&slot) {
                let grow = grows.get(&slot).copied().unwrap_or(false);
                snake.direction = snake.next_direction;
                snake.body.push_front(new_head);
                if !grow {
                    snake.body.pop_back();
                }
            }
        }

        // 4. Collision detection, after all snakes have moved.
        let mut dead: Vec<u8> = Vec::new();
        let slots: Vec<u8> = self.snakes.keys().copied().collect();
        for &slot in &slots {
            let snake = &self.snakes[&slot];
            if !snake.alive {
                continue;
            }
            let head = snake.head();
            if !head.in_bounds(config.grid_width, config.grid_height) {
                dead.push(slot);
                continue;
            }
            if snake.tail().any(|&c| c == head) {
                dead.push(slot);
                continue;
            }
            for &other_slot in &slots {
                if other_slot == slot {
                    continue;
                }
                let other = &self.snakes[&other_slot];
                if other.alive && other.body.iter().any(|&c| c == head) {
                    dead.push(slot);
                    break;
                }
            }
        }

        // Head-on: both alive, heads equal, or heads swapped with the
        // other's previous head (pre-move heads are `predicted_heads`).
        if slots.len() == 2 {
            let (a, b) = (slots[0], slots[1]);
            let (sa, sb) = (&self.snakes[&a], &self.snakes[&b]);
            if sa.alive && sb.alive {
                let head_a = sa.head();
                let head_b = sb.head();
                let same_cell = head_a == head_b;
                // Swap condition: each snake's new head equals the other
                // snake's head from before this tick's move.
                let crossed = old_heads.get(&a) == Some(&head_b) && old_heads.get(&b) == Some(&head_a);
                if same_cell || crossed {
                    dead.push(a);
                    dead.push(b);
                }
            }
        }

        dead.sort_unstable();
        dead.dedup();
        for slot in dead {
            if let Some(snake) = self.snakes.get_mut(&slot) {
                snake.alive = false;
            }
        }

        // 5. Termination & tiebreak.
        let alive: Vec<u8> = self
            .snakes
            .iter()
            .filter(|(_, s)| s.alive)
            .map(|(&slot, _)| slot)
            .collect();
        if alive.len() == 1 {
            self.winner = Some(alive[0]);
            self.running = false;
        } else if alive.is_empty() {
            self.winner = self.resolve_tiebreak();
            self.running = false;
        }

        // 6. Fruit lifecycle — every tick, even terminal.
        self.ticks_since_last_fruit += 1;
        self.foods.retain_mut(|fruit| match fruit.lifetime {
            None => true,
            Some(n) => {
                let remaining = n.saturating_sub(1);
                fruit.lifetime = Some(remaining);
                remaining > 0
            }
        });
        self.maybe_spawn_fruit(config);
    }

    fn resolve_tiebreak(&self) -> Option<u8> {
        let mut slots: Vec<u8> = self.snakes.keys().copied().collect();
        slots.sort_unstable();
        if slots.len() != 2 {
            return None;
        }
        let (a, b) = (slots[0], slots[1]);
        let (sa, sb) = (&self.snakes[&a], &self.snakes[&b]);
        if sa.len() != sb.len() {
            return if sa.len() > sb.len() { Some(a) } else { Some(b) };
        }
        match (sa.changed_direction_last_move, sb.changed_direction_last_move) {
            (true, false) => Some(b),
            (false, true) => Some(a),
            _ => None,
        }
    }

    fn maybe_spawn_fruit(&mut self, config: &GameConfig) {
        if self.foods.len() >= config.max_fruits {
            return;
        }
        if self.ticks_since_last_fruit < config.fruit_interval {
            return;
        }
        let total_weight: f64 = config.fruits.values().map(|c| c.propensity.max(0.0)).sum();
        if total_weight <= 0.0 {
            return;
        }
        let mut occupied: std::collections::HashSet<Position> = self
            .snakes
            .values()
            .flat_map(|s| s.body.iter().copied())
            .collect();
        occupied.extend(self.foods.iter().map(|f| f.position()));

        let empty: Vec<Position> = (0..config.grid_width)
            .flat_map(|x| (0..config.grid_height).map(move |y| Position::new(x, y)))
            .filter(|p| !occupied.contains(p))
            .collect();
        if empty.is_empty() {
            return;
        }

        let mut roll = self.rng.gen_range(0.0..total_weight);
        let mut chosen = FruitType::Apple;
        for kind in FruitType::ALL {
            let weight = config.fruits.get(&kind).map(|c| c.propensity.max(0.0)).unwrap_or(0.0);
            if weight <= 0.0 {
                continue;
            }
            if roll < weight {
                chosen = kind;
                break;
            }
            roll -= weight;
        }

        let position = empty[self.rng.gen_range(0..empty.len())];
        let lifetime = config.fruits.get(&chosen).and_then(|c| c.lifetime);
        self.foods.push(Fruit {
            x: position.x,
            y: position.y,
            kind: chosen,
            lifetime,
        });
        self.ticks_since_last_fruit = 0;
    }

    pub fn snapshot(&self, mode: &str, config: &GameConfig) -> GameSnapshot {
        GameSnapshot {
            mode: mode.to_string(),
            grid: GridDims {
                width: config.grid_width,
                height: config.grid_height,
            },
            snakes: self.snakes.clone(),
            foods: self
                .foods
                .iter()
                .map(|f| FruitSnapshot {
                    x: f.x,
                    y: f.y,
                    kind: f.kind,
                    lifetime: f
                        .lifetime
                        .filter(|&remaining| remaining <= config.fruit_warning),
                })
                .collect(),
            running: self.running,
            winner: self.winner,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GridDims {
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FruitSnapshot {
    pub x: i32,
    pub y: i32,
    #[serde(rename = "type")]
    pub kind: FruitType,
    pub lifetime: Option<u32>,
}

/// The `game` payload inside a `state` message (spec.md §6).
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GameSnapshot {
    pub mode: String,
    pub grid: GridDims,
    pub snakes: HashMap<u8, Snake>,
    pub foods: Vec<FruitSnapshot>,
    pub running: bool,
    pub winner: Option<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GameConfig {
        GameConfig {
            grid_width: 10,
            grid_height: 10,
            ..GameConfig::default()
        }
    }

    #[test]
    fn head_on_collision_both_die() {
        let cfg = config();
        let mut game = Game::new_seeded(&cfg, 1);
        game.snakes
            .insert(1, Snake::new(1, Position::new(4, 5), Direction::Right));
        game.snakes
            .insert(2, Snake::new(2, Position::new(5, 5), Direction::Left));
        game.foods.clear();

        game.step(&cfg);

        assert!(!game.snakes[&1].alive);
        assert!(!game.snakes[&2].alive);
        assert_eq!(game.winner, None);
        assert!(!game.running);
    }

    #[test]
    fn reversal_is_rejected() {
        let cfg = config();
        let mut game = Game::new_seeded(&cfg, 2);
        game.snakes
            .insert(1, Snake::new(1, Position::new(5, 5), Direction::Right));
        game.foods.clear();

        for _ in 0..3 {
            game.queue_direction(1, Direction::Left, &cfg);
        }
        assert!(game.snakes[&1].input_queue.is_empty());

        game.step(&cfg);
        assert_eq!(game.snakes[&1].direction, Direction::Right);
    }

    #[test]
    fn apple_grows_snake_by_one() {
        let cfg = GameConfig::default();
        let mut game = Game::new_seeded(&cfg, 3);
        let mut snake = Snake::new(1, Position::new(9, 5), Direction::Right);
        snake.body.push_back(Position::new(8, 5));
        snake.body.push_back(Position::new(7, 5));
        game.snakes.insert(1, snake);
        game.snakes.get_mut(&2).unwrap().alive = false;
        game.foods = vec![Fruit {
            x: 10,
            y: 5,
            kind: FruitType::Apple,
            lifetime: None,
        }];
        game.ticks_since_last_fruit = 0;

        game.step(&cfg);

        let s = &game.snakes[&1];
        assert_eq!(s.len(), 4);
        assert_eq!(s.head(), Position::new(10, 5));
        assert!(game.foods.iter().all(|f| f.position() != Position::new(10, 5)));
    }

    #[test]
    fn grapes_shrinks_opponent() {
        let cfg = GameConfig::default();
        let mut game = Game::new_seeded(&cfg, 4);
        let mut s1 = Snake::new(1, Position::new(9, 5), Direction::Right);
        s1.body.push_back(Position::new(8, 5));
        s1.body.push_back(Position::new(7, 5));
        game.snakes.insert(1, s1);

        let mut s2 = Snake::new(2, Position::new(0, 0), Direction::Down);
        for y in 1..5 {
            s2.body.push_back(Position::new(0, y));
        }
        game.snakes.insert(2, s2);

        game.foods = vec![Fruit {
            x: 10,
            y: 5,
            kind: FruitType::Grapes,
            lifetime: Some(60),
        }];
        game.ticks_since_last_fruit = 0;

        game.step(&cfg);

        assert_eq!(game.snakes[&1].len(), 4);
        assert_eq!(game.snakes[&2].len(), 4);
    }

    #[test]
    fn tiebreak_by_length_then_turn() {
        let cfg = config();
        let mut game = Game::new_seeded(&cfg, 5);
        // Equal length, only snake 1 turned: snake 2 wins.
        let s1 = game.snakes.get_mut(&1).unwrap();
        s1.changed_direction_last_move = true;
        let s2 = game.snakes.get_mut(&2).unwrap();
        s2.changed_direction_last_move = false;
        game.snakes.get_mut(&1).unwrap().alive = false;
        game.snakes.get_mut(&2).unwrap().alive = false;
        assert_eq!(game.resolve_tiebreak(), Some(2));
    }

    #[test]
    fn input_queue_caps_at_three_and_evicts_oldest() {
        let cfg = config();
        let mut game = Game::new_seeded(&cfg, 6);
        let snake = game.snakes.get_mut(&1).unwrap();
        snake.direction = Direction::Right;
        snake.next_direction = Direction::Right;
        // Each turn is perpendicular to the last, so all are accepted;
        // the 4th push must evict the oldest to stay within the cap.
        let turns = [
            Direction::Up,
            Direction::Right,
            Direction::Down,
            Direction::Left,
        ];
        for turn in turns {
            snake.queue_direction(turn, cfg.max_input_queue);
        }
        assert_eq!(snake.input_queue.len(), cfg.max_input_queue);
        assert_eq!(
            snake.input_queue.front().copied(),
            Some(Direction::Right)
        );
    }

    #[test]
    fn fruit_with_lifetime_one_is_removed_the_same_tick() {
        let cfg = config();
        let mut game = Game::new_seeded(&cfg, 7);
        game.foods.clear();
        game.foods.push(Fruit {
            x: 1,
            y: 1,
            kind: FruitType::Grapes,
            lifetime: Some(1),
        });
        game.ticks_since_last_fruit = 0;

        game.step(&cfg);

        assert!(game.foods.iter().all(|f| f.position() != Position::new(1, 1)));
    }
}
