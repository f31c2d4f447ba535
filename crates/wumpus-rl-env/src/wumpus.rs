//! Hunt the Wumpus grid world
//!
//! The player starts in the bottom-left corner of a square grid holding
//! hidden pits, one or more wumpuses and a pile of gold. Grabbing the gold
//! and walking back to the start wins; stepping into a pit or a wumpus
//! loses. Arrows fired in the facing direction kill an adjacent wumpus.

use async_trait::async_trait;
use ndarray::{arr1, Array2};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};

use wumpus_rl_core::{
    DiscreteAction, DiscreteSpace, Environment, Observation, RLError, Result, Step, StepInfo,
};

/// Grid cell as `(row, column)`, row 0 at the top
pub type Cell = (usize, usize);

/// Player actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WumpusAction {
    /// Move one row up
    Up,
    /// Move one row down
    Down,
    /// Move one column left
    Left,
    /// Move one column right
    Right,
    /// Fire an arrow into the cell the player faces
    Shoot,
}

impl WumpusAction {
    /// All actions, indexed by their discrete action number
    pub const ALL: [Self; 5] = [Self::Up, Self::Down, Self::Left, Self::Right, Self::Shoot];

    /// Discrete action number
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    fn delta(self) -> Option<(isize, isize)> {
        match self {
            Self::Up => Some((-1, 0)),
            Self::Down => Some((1, 0)),
            Self::Left => Some((0, -1)),
            Self::Right => Some((0, 1)),
            Self::Shoot => None,
        }
    }
}

impl TryFrom<DiscreteAction> for WumpusAction {
    type Error = RLError;

    fn try_from(action: DiscreteAction) -> Result<Self> {
        Self::ALL
            .get(action.index())
            .copied()
            .ok_or_else(|| RLError::InvalidAction(format!("no wumpus action {}", action.index())))
    }
}

/// Reward paid for each game event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardTable {
    /// Every successful move
    pub step: f32,
    /// Extra for each move made while carrying the gold
    pub carry_bonus: f32,
    /// Picking up the gold
    pub gold: f32,
    /// Returning to the start with the gold
    pub win: f32,
    /// Killing a wumpus
    pub kill: f32,
    /// Entering a pit or a wumpus's cell
    pub death: f32,
    /// Walking into the edge of the grid
    pub wall_bump: f32,
}

impl Default for RewardTable {
    fn default() -> Self {
        Self {
            step: 5.0,
            carry_bonus: 10.0,
            gold: 1000.0,
            win: 2000.0,
            kill: 200.0,
            death: -1000.0,
            wall_bump: -1.0,
        }
    }
}

/// Fixed placement of hazards and gold
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    /// Wumpus cells
    pub wumpus: Vec<Cell>,
    /// Pit cells
    pub pits: Vec<Cell>,
    /// Gold cell
    pub gold: Cell,
}

/// Wumpus world settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WumpusConfig {
    /// Side length of the square grid
    pub grid_size: usize,
    /// Number of pits
    pub num_pits: usize,
    /// Number of wumpuses
    pub num_wumpus: usize,
    /// Arrows at the start of each episode
    pub arrows: usize,
    /// Reward table
    pub rewards: RewardTable,
    /// Use this placement on every reset instead of a random one
    pub layout: Option<Layout>,
    /// Seed for hazard placement; entropy when absent
    pub seed: Option<u64>,
}

impl Default for WumpusConfig {
    fn default() -> Self {
        Self {
            grid_size: 10,
            num_pits: 10,
            num_wumpus: 1,
            arrows: 1,
            rewards: RewardTable::default(),
            layout: None,
            seed: None,
        }
    }
}

impl WumpusConfig {
    /// Cell the player starts on and must return to
    #[must_use]
    pub fn start(&self) -> Cell {
        (self.grid_size.saturating_sub(1), 0)
    }

    /// Check that the hazards fit on the grid
    ///
    /// # Errors
    ///
    /// [`RLError::Config`] describing the problem.
    pub fn validate(&self) -> Result<()> {
        let g = self.grid_size;
        if g < 2 {
            return Err(RLError::Config(format!("grid_size must be at least 2, got {g}")));
        }
        if self.num_wumpus > g * (g - 1) {
            return Err(RLError::Config(format!(
                "{} wumpuses do not fit above the bottom row",
                self.num_wumpus
            )));
        }
        if self.num_wumpus + self.num_pits + 1 > g * g - 1 {
            return Err(RLError::Config(format!(
                "{} pits, {} wumpuses and the gold do not fit on a {g}x{g} grid",
                self.num_pits, self.num_wumpus
            )));
        }
        if let Some(layout) = &self.layout {
            self.validate_layout(layout)?;
        }
        Ok(())
    }

    fn validate_layout(&self, layout: &Layout) -> Result<()> {
        if layout.wumpus.len() != self.num_wumpus || layout.pits.len() != self.num_pits {
            return Err(RLError::Config(format!(
                "layout has {} wumpuses and {} pits, config expects {} and {}",
                layout.wumpus.len(),
                layout.pits.len(),
                self.num_wumpus,
                self.num_pits
            )));
        }
        let mut cells: Vec<Cell> = layout.wumpus.iter().chain(&layout.pits).copied().collect();
        cells.push(layout.gold);
        if let Some(&(r, c)) = cells.iter().find(|&&(r, c)| r >= self.grid_size || c >= self.grid_size) {
            return Err(RLError::Config(format!("layout cell ({r}, {c}) is off the grid")));
        }
        if cells.contains(&self.start()) {
            return Err(RLError::Config("layout occupies the start cell".into()));
        }
        cells.sort_unstable();
        cells.dedup();
        if cells.len() != self.num_wumpus + self.num_pits + 1 {
            return Err(RLError::Config("layout cells overlap".into()));
        }
        Ok(())
    }
}

/// Hunt the Wumpus environment.
///
/// Observations always carry the same array shapes: a killed wumpus is
/// reported at `(-1, -1)` so the encoded state length never changes.
pub struct WumpusEnv {
    config: WumpusConfig,
    rng: StdRng,
    player: Cell,
    facing: (isize, isize),
    wumpus: Vec<Option<Cell>>,
    pits: Vec<Cell>,
    gold: Cell,
    has_gold: bool,
    arrows: usize,
    visited: Array2<f32>,
    score: f64,
    done: bool,
}

impl WumpusEnv {
    /// Create a world with a fresh layout, ready to step
    ///
    /// # Errors
    ///
    /// [`RLError::Config`] if the configuration is invalid.
    pub fn new(config: WumpusConfig) -> Result<Self> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let g = config.grid_size;
        let mut env = Self {
            rng,
            player: config.start(),
            facing: (0, 1),
            wumpus: Vec::new(),
            pits: Vec::new(),
            gold: (0, 0),
            has_gold: false,
            arrows: config.arrows,
            visited: Array2::zeros((g, g)),
            score: 0.0,
            done: false,
            config,
        };
        env.new_episode()?;
        Ok(env)
    }

    fn new_episode(&mut self) -> Result<()> {
        let layout = match &self.config.layout {
            Some(layout) => layout.clone(),
            None => self.random_layout()?,
        };
        self.wumpus = layout.wumpus.into_iter().map(Some).collect();
        self.pits = layout.pits;
        self.gold = layout.gold;

        let start = self.config.start();
        self.player = start;
        self.facing = (0, 1);
        self.has_gold = false;
        self.arrows = self.config.arrows;
        self.visited.fill(0.0);
        self.visited[[start.0, start.1]] = 1.0;
        self.score = 0.0;
        self.done = false;
        Ok(())
    }

    fn random_layout(&mut self) -> Result<Layout> {
        let g = self.config.grid_size;
        let start = self.config.start();

        // wumpuses never spawn on the start row
        let mut lairs: Vec<Cell> = (0..g - 1).flat_map(|r| (0..g).map(move |c| (r, c))).collect();
        lairs.shuffle(&mut self.rng);
        lairs.truncate(self.config.num_wumpus);

        let mut free: Vec<Cell> = (0..g)
            .flat_map(|r| (0..g).map(move |c| (r, c)))
            .filter(|cell| *cell != start && !lairs.contains(cell))
            .collect();
        free.shuffle(&mut self.rng);
        let gold = free
            .pop()
            .ok_or_else(|| RLError::Environment("no free cell for the gold".into()))?;
        free.truncate(self.config.num_pits);

        Ok(Layout {
            wumpus: lairs,
            pits: free,
            gold,
        })
    }

    fn neighbor(&self, (r, c): Cell, (dr, dc): (isize, isize)) -> Option<Cell> {
        let r = r.checked_add_signed(dr)?;
        let c = c.checked_add_signed(dc)?;
        (r < self.config.grid_size && c < self.config.grid_size).then_some((r, c))
    }

    fn wumpus_at(&self, cell: Cell) -> bool {
        self.wumpus.contains(&Some(cell))
    }

    fn move_player(&mut self, delta: (isize, isize)) -> (f32, &'static str) {
        let rewards = &self.config.rewards;
        self.facing = delta;
        let Some(next) = self.neighbor(self.player, delta) else {
            return (rewards.wall_bump, "bump");
        };

        self.player = next;
        self.visited[[next.0, next.1]] = 1.0;
        let mut reward = rewards.step;
        if self.has_gold {
            reward += rewards.carry_bonus;
        }

        if self.pits.contains(&next) {
            self.done = true;
            return (reward + rewards.death, "pit");
        }
        if self.wumpus_at(next) {
            self.done = true;
            return (reward + rewards.death, "eaten");
        }

        let mut event = "moved";
        if next == self.gold && !self.has_gold {
            self.has_gold = true;
            reward += rewards.gold;
            event = "gold";
        }
        if self.has_gold && next == self.config.start() {
            self.done = true;
            reward += rewards.win;
            event = "won";
        }
        (reward, event)
    }

    fn shoot(&mut self) -> (f32, &'static str) {
        if self.arrows == 0 {
            return (0.0, "no_arrows");
        }
        self.arrows -= 1;

        let target = self.neighbor(self.player, self.facing);
        match self.wumpus.iter_mut().find(|w| w.is_some() && **w == target) {
            Some(slot) => {
                *slot = None;
                self.arrows += 2;
                (self.config.rewards.kill, "killed")
            }
            None => (0.0, "missed"),
        }
    }

    /// Whether a pit borders `cell`
    #[must_use]
    pub fn breeze(&self, cell: Cell) -> bool {
        self.pits.iter().any(|&pit| manhattan(pit, cell) == 1)
    }

    /// Whether a living wumpus borders `cell`
    #[must_use]
    pub fn stench(&self, cell: Cell) -> bool {
        self.wumpus.iter().flatten().any(|&w| manhattan(w, cell) == 1)
    }

    /// Current observation
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn observation(&self) -> Observation {
        let coord = |(r, c): Cell, axis: usize| if axis == 0 { r as f32 } else { c as f32 };
        let wumpus = Array2::from_shape_fn((self.wumpus.len(), 2), |(i, j)| {
            self.wumpus[i].map_or(-1.0, |cell| coord(cell, j))
        });
        let pits = Array2::from_shape_fn((self.pits.len(), 2), |(i, j)| coord(self.pits[i], j));

        Observation::new()
            .with("grid_size", arr1(&[self.config.grid_size as f32]))
            .with("player_pos", arr1(&[coord(self.player, 0), coord(self.player, 1)]))
            .with("wumpus_positions", wumpus)
            .with("pit_positions", pits)
            .with("gold_position", arr1(&[coord(self.gold, 0), coord(self.gold, 1)]))
            .with("has_gold", arr1(&[if self.has_gold { 1.0 } else { 0.0 }]))
            .with("visited_cells", self.visited.clone())
    }

    /// Player position
    #[must_use]
    pub fn player(&self) -> Cell {
        self.player
    }

    /// Whether the player carries the gold
    #[must_use]
    pub fn has_gold(&self) -> bool {
        self.has_gold
    }

    /// Arrows left
    #[must_use]
    pub fn arrows(&self) -> usize {
        self.arrows
    }

    /// Sum of rewards this episode
    #[must_use]
    pub fn score(&self) -> f64 {
        self.score
    }

    /// Whether the episode has ended
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// World settings
    #[must_use]
    pub fn config(&self) -> &WumpusConfig {
        &self.config
    }
}

fn manhattan(a: Cell, b: Cell) -> usize {
    a.0.abs_diff(b.0) + a.1.abs_diff(b.1)
}

#[async_trait]
impl Environment for WumpusEnv {
    fn action_space(&self) -> DiscreteSpace {
        DiscreteSpace::new(WumpusAction::ALL.len())
    }

    async fn reset(&mut self) -> Result<Observation> {
        self.new_episode()?;
        Ok(self.observation())
    }

    async fn step(&mut self, action: DiscreteAction) -> Result<Step> {
        if self.done {
            return Err(RLError::Environment("episode is over, call reset".into()));
        }
        let action = WumpusAction::try_from(action)?;
        let (reward, event) = match action.delta() {
            Some(delta) => self.move_player(delta),
            None => self.shoot(),
        };
        self.score += f64::from(reward);

        if self.done {
            tracing::debug!(event, score = self.score, "wumpus episode ended");
        }

        let mut info = StepInfo::default();
        info.insert("event", event);
        info.insert("score", self.score);
        info.insert("arrows", self.arrows);
        info.insert("breeze", self.breeze(self.player));
        info.insert("stench", self.stench(self.player));

        Ok(Step {
            observation: self.observation(),
            reward,
            done: self.done,
            truncated: false,
            info,
        })
    }
}
