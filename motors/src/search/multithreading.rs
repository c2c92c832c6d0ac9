use colored::Colorize;
use std::hint::spin_loop;
use std::marker::PhantomData;
use std::sync::atomic::Ordering::{Acquire, Relaxed, Release};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicIsize, AtomicU64, AtomicUsize};
use std::sync::{Arc, Mutex, MutexGuard};

use gears::games::ZobristHistory;
use gears::general::board::Board;

use crate::eval::Eval;
use gears::general::common::{parse_int_from_str, Res};
use gears::general::moves::Move;
use gears::output::Message::*;
use gears::score::{Score, NO_SCORE_YET};
use gears::search::{Depth, SearchLimit};
use gears::ugi::EngineOptionNameForProto;
use gears::ugi::EngineOptionName::{Hash, Threads};

use crate::search::multithreading::EngineReceives::*;
use crate::search::multithreading::SearchThreadType::{Auxiliary, Main};
use crate::search::multithreading::SearchType::{Infinite, Normal, Ponder};
use crate::search::tt::TT;
use crate::search::{
    AbstractEvalBuilder, AbstractSearcherBuilder, Engine, EngineInfo, SearchParams, SearchState,
};
use crate::io::ugi_output::UgiOutput;

pub type Sender<T> = crossbeam_channel::Sender<T>;
pub type Receiver<T> = crossbeam_channel::Receiver<T>;
pub type TryRecvError = crossbeam_channel::TryRecvError;

/// The logical core the search thread should be pinned to, or `None` to leave scheduling to the OS.
/// Set through the `CoreAff` UCI option; applied the next time the search thread starts a search.
pub type CoreAffinity = Option<usize>;

pub enum EngineReceives<B: Board> {
    // joins the thread
    Quit,
    Forget,
    SetOption(EngineOptionNameForProto, String, Arc<Mutex<EngineInfo>>),
    SetCoreAffinity(CoreAffinity),
    Search(SearchParams<B>),
    Bench(B, SearchLimit, Arc<Mutex<UgiOutput<B>>>),
    TTEntry(B, Arc<Mutex<UgiOutput<B>>>),
    EvalFor(B, Arc<Mutex<UgiOutput<B>>>),
    SetEval(Box<dyn Eval<B>>),
    LoadEvalParams(String),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SearchType {
    Normal,
    Infinite,
    Ponder,
}

impl SearchType {
    pub fn new(ponder: bool, limit: &SearchLimit) -> Self {
        if ponder {
            Ponder
        } else if limit.is_infinite() {
            Infinite
        } else {
            Normal
        }
    }
}

/// The `EngineWrapper` stores one instance of this, which gets cloned and sent to the search thread on a search.
/// This engine is single-threaded: there is exactly one search thread, so `atomic_search_data` holds a single
/// shared state instead of one per Lazy-SMP helper thread.
#[derive(Debug, Clone)]
pub struct MainThreadData<B: Board> {
    atomic_search_data: Arc<AtomicSearchState<B>>,
    pub output: Arc<Mutex<UgiOutput<B>>>,
    pub engine_info: Arc<Mutex<EngineInfo>>,
    // Not atomic because it doesn't need to be shared across threads: The main search thread sets it at the start
    // and checks if it is set when the search is finished
    pub search_type: SearchType,
}

impl<B: Board> MainThreadData<B> {
    pub fn new_search(&mut self, ponder: bool, limit: &SearchLimit) -> Res<()> {
        if self.atomic_search_data.currently_searching() {
            return Err(
                format!("Cannot start a new search with limit '{limit}' because the engine is already searching"),
            );
        }
        self.search_type = SearchType::new(ponder, limit);
        self.atomic_search_data.reset(true);
        Ok(())
    }

    /// All atomic search states feeding into this search's aggregated node count and seldepth.
    /// Always a single entry: this engine has exactly one search thread.
    pub fn shared_atomic_state(&self) -> &[Arc<AtomicSearchState<B>>] {
        std::slice::from_ref(&self.atomic_search_data)
    }
}

#[derive(Debug, Default)]
pub enum SearchThreadType<B: Board> {
    Main(MainThreadData<B>),
    #[default]
    /// The simple case of using the engine by itself, without the multithreading adapter, simply to find the best move,
    /// also uses the `Auxiliary` variant because there's no need to output anything.
    Auxiliary,
}

impl<B: Board> SearchThreadType<B> {
    pub fn output(&self) -> Option<MutexGuard<UgiOutput<B>>> {
        match self {
            Main(MainThreadData { output, .. }) => Some(output.lock().unwrap()),
            Auxiliary => None,
        }
    }

    pub fn new_single_thread(
        output: Arc<Mutex<UgiOutput<B>>>,
        engine_info: Arc<Mutex<EngineInfo>>,
        atomic: Arc<AtomicSearchState<B>>,
    ) -> Self {
        Main(MainThreadData { atomic_search_data: atomic, output, engine_info, search_type: Normal })
    }
}

#[derive(Debug)]
#[repr(align(64))] // Prevent false sharing
pub struct AtomicSearchState<B: Board> {
    // All combinations of should_stop and currently_searching are (briefly) possible.
    // The default is both being false.
    // When it starts searching `searching` gets set to true.
    // When `stop` gets set the engine begins to stop.
    // When it has actually stopped it sets `currently_searching` to false.
    // If it has stopped without receiving a `stop` or reaching a limit
    // (i.e. infinite search has exceeded max depth), both are false.

    // This flag indicates that the engine should stop searching. It can be set by the UGI thread upon receiving a "stop"
    // command, or it can be set by the engine when a limiting stop condition is reached. It is not set upon exceeding the
    // max depth of an infinite search.
    should_stop: AtomicBool,
    // True if the engine is currently searching. Note that if an infinite search reaches its internal end condition but
    // hasn't yet been stopped, this is set to false; the thread may still spin until it receives a stop.
    pub(super) currently_searching: AtomicBool,
    pub suppress_best_move: AtomicBool,
    nodes: AtomicU64,
    depth: AtomicIsize,
    seldepth: AtomicUsize,
    best_move: AtomicUsize,
    ponder_move: AtomicUsize,
    score: AtomicI32,
    phantom_data: PhantomData<B>,
}

impl<B: Board> Default for AtomicSearchState<B> {
    fn default() -> Self {
        Self {
            should_stop: AtomicBool::new(false),
            currently_searching: AtomicBool::new(false),
            suppress_best_move: AtomicBool::new(false),
            nodes: AtomicU64::new(0),
            depth: AtomicIsize::new(0),
            seldepth: AtomicUsize::new(0),
            best_move: AtomicUsize::new(B::Move::default().to_underlying().into()),
            ponder_move: AtomicUsize::new(B::Move::default().to_underlying().into()),
            score: AtomicI32::new(NO_SCORE_YET.0),
            phantom_data: PhantomData,
        }
    }
}

impl<B: Board> AtomicSearchState<B> {
    /// Resets all search-derived state. `hard` exists for API parity with the rest of the engine's
    /// forget/reset split; since there is only one search thread here, both reset everything.
    pub fn reset(&self, _hard: bool) {
        // all stores can be Relaxed because we're overwriting all members
        self.set_score(NO_SCORE_YET);
        self.set_ponder_move(None);
        self.set_best_move(B::Move::default());
        self.update_seldepth(0);
        self.set_depth(0);
        self.nodes.store(0, Relaxed);
        self.set_searching(false);
        self.suppress_best_move.store(false, Relaxed);
        self.should_stop.store(false, Relaxed);
    }

    pub fn stop_flag(&self) -> bool {
        self.should_stop.load(Acquire)
    }

    /// Intended to be used by the search thread, uses Relaxed ordering.
    /// Note that any other thread might want to load with Acquire semantic.
    pub(super) fn currently_searching(&self) -> bool {
        self.currently_searching.load(Relaxed)
    }

    /// Should only be used by the search thread, uses Relaxed ordering. Any other thread should never set this value.
    pub(super) fn set_searching(&self, val: bool) {
        self.currently_searching.store(val, Relaxed);
    }

    pub fn nodes(&self) -> u64 {
        self.nodes.load(Relaxed)
    }

    pub fn iterations(&self) -> Depth {
        Depth::new_unchecked(self.depth.load(Relaxed) as usize)
    }

    pub fn seldepth(&self) -> Depth {
        Depth::new_unchecked(self.seldepth.load(Relaxed))
    }

    pub fn score(&self) -> Score {
        Score(self.score.load(Relaxed))
    }

    pub fn best_move(&self) -> B::Move {
        B::Move::from_usize_unchecked(self.best_move.load(Relaxed)).trust_unchecked()
    }

    pub fn ponder_move(&self) -> Option<B::Move> {
        let mov = B::Move::from_usize_unchecked(self.ponder_move.load(Relaxed)).trust_unchecked();
        if mov == B::Move::default() {
            None
        } else {
            Some(mov)
        }
    }

    pub fn set_stop(&self, val: bool) {
        self.should_stop.store(val, Release)
    }

    /// Records a visited node and returns the new total, so callers can compare against a node limit
    /// without a separate load.
    pub fn count_node(&self) -> u64 {
        self.nodes.fetch_add(1, Relaxed) + 1
    }

    pub fn set_depth(&self, depth: isize) {
        self.depth.store(depth, Relaxed);
    }

    pub fn update_seldepth(&self, current_seldepth: usize) {
        self.seldepth.fetch_max(current_seldepth, Relaxed);
    }

    pub fn set_score(&self, score: Score) {
        debug_assert!(score.verify_valid().is_some());
        self.score.store(score.0, Relaxed);
    }

    pub fn set_best_move(&self, best: B::Move) {
        self.best_move.store(best.to_underlying().into(), Relaxed);
    }

    pub fn set_ponder_move(&self, ponder_move: Option<B::Move>) {
        self.ponder_move.store(
            ponder_move.unwrap_or_default().to_underlying().into(),
            Relaxed,
        );
    }
}

fn pin_current_thread_to(core: CoreAffinity) {
    let Some(id) = core else { return };
    if !core_affinity::set_for_current(core_affinity::CoreId { id }) {
        eprintln!("info string warning: failed to pin the search thread to core {id}");
    }
}

pub struct EngineThread<B: Board> {
    engine: Box<dyn Engine<B>>,
    receiver: Receiver<EngineReceives<B>>,
}

impl<B: Board> EngineThread<B> {
    pub fn new(engine: Box<dyn Engine<B>>, receiver: Receiver<EngineReceives<B>>) -> Self {
        Self { engine, receiver }
    }

    fn start_search(&mut self, params: SearchParams<B>) {
        let _ = self.engine.search(params); // the engine takes care of sending the search result
    }

    fn bench_single_position(
        &mut self,
        pos: B,
        limit: SearchLimit,
        output: Arc<Mutex<UgiOutput<B>>>,
    ) {
        let res = self.engine.clean_bench(pos, limit);
        output.lock().unwrap().write_ugi(&res.to_string());
    }

    fn get_tt_entry(&mut self, pos: B, output: Arc<Mutex<UgiOutput<B>>>) {
        if let Some(entry) = self
            .engine
            .search_state_dyn()
            .search_params()
            .tt
            .load::<B>(pos.zobrist_hash(), 0)
        {
            let msg = format!(
                "move {0} score {1} bound {2} depth {3}",
                entry.mov,
                entry.score,
                entry.bound(),
                entry.depth
            );
            output.lock().unwrap().write_ugi(&msg);
        } else {
            output.lock().unwrap().write_ugi("<none>");
        };
    }

    fn get_static_eval(&mut self, pos: B, output: Arc<Mutex<UgiOutput<B>>>) {
        let eval = self.engine.static_eval(&pos, 0);
        output
            .lock()
            .unwrap()
            .write_ugi(&format!("score cp {eval}"));
    }

    fn write_error(&mut self, msg: &str) {
        self.engine.search_state_mut_dyn().send_non_ugi(Error, msg);
        eprintln!("Engine thread encountered a fatal error: '{msg}'");
    }

    fn handle_input(&mut self, received: EngineReceives<B>) -> Res<bool> {
        match received {
            Quit => {
                return Ok(true);
            }
            Forget => {
                self.engine.forget();
            }
            SetOption(name, value, info) => match name {
                Threads => panic!("This should have already been handled by the engine owner"),
                _ => {
                    let mut guard = info.lock().unwrap();
                    let Some(val) = guard.options.get_mut(&name) else {
                        return Err(format!("The engine '{0}' doesn't provide the option '{1}', so it can't be set to value '{2}'", guard.engine.short.bold(), name.to_string().red(), value.bold()));
                    };
                    self.engine.set_option(name, val, value)?
                }
            },
            SetCoreAffinity(core) => pin_current_thread_to(core),
            Search(params) => {
                self.start_search(params);
            }
            Bench(pos, limit, output) => self.bench_single_position(pos, limit, output),
            TTEntry(pos, output) => self.get_tt_entry(pos, output),
            EvalFor(pos, output) => self.get_static_eval(pos, output),
            SetEval(eval) => self.engine.set_eval(eval),
            LoadEvalParams(path) => {
                if let Err(err) = self.engine.load_eval_params(&path) {
                    self.write_error(&format!("cannot load network file '{path}': {err}"));
                }
            }
        };
        Ok(false)
    }

    pub fn try_handle_input(&mut self) -> Res<bool> {
        match self.receiver.recv() {
            Ok(msg) => self.handle_input(msg),
            Err(_err) => Ok(true),
        }
    }

    pub fn main_loop(&mut self) {
        // do this here so that it's run in the (single) search thread, which means we don't run into multithreading problems
        self.engine.print_spsa_params();
        loop {
            match self.try_handle_input() {
                Err(msg) => {
                    self.write_error(&msg);
                    break;
                }
                Ok(should_quit) => {
                    if should_quit {
                        break;
                    }
                }
            }
        }
        // Exit the main loop, cleaning up all allocated resources
    }
}

/// Owns the single search thread and the channel used to drive it. The UGI-facing thread never
/// touches search state directly: it sends messages and reads back the shared [`AtomicSearchState`].
/// This engine does not implement Lazy-SMP; `Threads` only ever accepts the value `1`, and parallelism
/// is instead exposed as a choice of which logical core the one search thread is pinned to (`CoreAff`).
#[derive(Debug)]
#[must_use]
pub struct EngineWrapper<B: Board> {
    main: Sender<EngineReceives<B>>,
    searcher_builder: Box<dyn AbstractSearcherBuilder<B>>,
    eval_builder: Box<dyn AbstractEvalBuilder<B>>,
    main_thread_data: MainThreadData<B>,
    // If we receive a `setoption name Hash` while searching, we only apply that to the next search
    tt_for_next_search: TT,
    core_affinity: CoreAffinity,
}

impl<B: Board> Drop for EngineWrapper<B> {
    fn drop(&mut self) {
        _ = self.main.send(Quit);
    }
}

impl<B: Board> EngineWrapper<B> {
    pub fn new(
        tt: TT,
        output: Arc<Mutex<UgiOutput<B>>>,
        searcher_builder: Box<dyn AbstractSearcherBuilder<B>>,
        eval_builder: Box<dyn AbstractEvalBuilder<B>>,
    ) -> Self {
        let atomic = Arc::new(AtomicSearchState::default());
        let (main, info) = searcher_builder.build_in_new_thread(eval_builder.build());
        let main_thread_data = MainThreadData {
            atomic_search_data: atomic,
            output,
            engine_info: Arc::new(Mutex::new(info)),
            search_type: Normal,
        };
        EngineWrapper {
            main,
            searcher_builder,
            eval_builder,
            main_thread_data,
            tt_for_next_search: tt,
            core_affinity: None,
        }
    }

    pub fn start_search(
        &mut self,
        pos: B,
        limit: SearchLimit,
        history: ZobristHistory<B>,
        search_moves: Option<Vec<B::Move>>,
        multi_pv: usize,
        ponder: bool,
    ) -> Res<()> {
        self.main_thread_data.new_search(ponder, &limit)?; // resets the atomic search state
        let thread_data = self.main_thread_data.clone();
        let params = SearchParams::create(
            pos,
            limit,
            history.clone(),
            self.tt_for_next_search.clone(),
            search_moves.clone(),
            multi_pv - 1,
            thread_data.atomic_search_data.clone(),
            Main(thread_data),
        );
        self.start_search_with(params)
    }

    fn start_search_with(&mut self, params: SearchParams<B>) -> Res<()> {
        Self::send_start_search(&mut self.main, params)
    }

    fn send_start_search(
        sender: &mut Sender<EngineReceives<B>>,
        params: SearchParams<B>,
    ) -> Res<()> {
        debug_assert!(Arc::strong_count(&params.atomic) >= 2);
        sender.send(Search(params)).map_err(|err| err.to_string())
    }

    pub fn set_tt(&mut self, tt: TT) {
        // this sets the TT without overwriting any potential copy used by a search thread
        // (which would only exist when a search thread is currently searching)
        self.tt_for_next_search = tt;
    }

    pub fn next_tt(&self) -> TT {
        self.tt_for_next_search.clone()
    }

    pub fn set_option(&mut self, name: EngineOptionName, value: String) -> Res<()> {
        if name == Threads {
            let count: usize = parse_int_from_str(&value, "num threads")?;
            if count != 1 {
                return Err(
                    "This engine is single-threaded; 'Threads' can only be set to 1. \
                    Use 'CoreAff' to pin the search thread to a logical core instead."
                        .to_string(),
                );
            }
            Ok(())
        } else if name == Hash {
            let value: usize = parse_int_from_str(&value, "hash size in mb")?;
            let size = value * 1_000_000;
            // first, give back the memory of the old TT to avoid spikes in memory usage
            self.set_tt(TT::minimal());
            self.set_tt(TT::new_with_bytes(size));
            Ok(())
        } else if name.name() == "CoreAff" {
            let core: isize = parse_int_from_str(&value, "core affinity")?;
            let max_core = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1) as isize - 1;
            if core < -1 || core > max_core {
                return Err(format!("'CoreAff' must be between -1 and {max_core}, got {core}"));
            }
            self.core_affinity = if core < 0 { None } else { Some(core as usize) };
            self.main
                .send(SetCoreAffinity(self.core_affinity))
                .map_err(|err| err.to_string())
        } else if name.name() == "NNUEPath" {
            self.load_eval_params(value)
        } else if name.name() == "SyzygyPath" {
            // Syzygy tablebase probing is outside this engine's scope; accept and ignore the path
            // so GUIs that always send it on startup don't see a spurious error.
            Ok(())
        } else {
            self.main
                .send(SetOption(
                    name,
                    value,
                    self.main_thread_data.engine_info.clone(),
                ))
                .map_err(|err| err.to_string())
        }
    }

    pub fn start_bench(&mut self, pos: B, limit: SearchLimit) -> Res<()> {
        self.main
            .send(Bench(pos, limit, self.main_thread_data.output.clone()))
            .map_err(|err| err.to_string())
    }

    pub fn static_eval(&mut self, pos: B) -> Res<()> {
        self.main
            .send(EvalFor(pos, self.main_thread_data.output.clone()))
            .map_err(|err| err.to_string())
    }

    pub fn tt_entry(&mut self, pos: B) -> Res<()> {
        self.main
            .send(TTEntry(pos, self.main_thread_data.output.clone()))
            .map_err(|err| err.to_string())
    }

    pub fn set_eval(&mut self, eval: Box<dyn Eval<B>>) -> Res<()> {
        self.main.send(SetEval(eval)).map_err(|err| err.to_string())
    }

    pub fn load_eval_params(&mut self, path: String) -> Res<()> {
        self.main
            .send(LoadEvalParams(path))
            .map_err(|err| err.to_string())
    }

    pub fn send_stop(&mut self, suppress_best_move: bool) {
        let atomic = &self.main_thread_data.atomic_search_data;
        if suppress_best_move {
            atomic.suppress_best_move.store(true, Release);
        }
        atomic.set_stop(true);
        while atomic.currently_searching.load(Acquire) {
            spin_loop(); // this should only take a short while
        }
        if suppress_best_move {
            atomic.suppress_best_move.store(false, Release);
        }
    }

    pub fn send_quit(&mut self) -> Res<()> {
        self.send_stop(false);
        self.main.send(Quit).map_err(|err| err.to_string())
    }

    pub fn send_forget(&mut self) -> Res<()> {
        // tt_for_next_search references the same TT as the TT used during search unless it has been changed with `setoption`
        self.tt_for_next_search.forget();
        self.main.send(Forget).map_err(|err| err.to_string())
    }

    pub fn engine_info(&self) -> MutexGuard<EngineInfo> {
        self.main_thread_data.engine_info.lock().unwrap()
    }

    pub fn num_threads(&self) -> usize {
        1
    }
}
