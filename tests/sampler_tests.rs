use proptest::prelude::*;
use ruleforge::config::PriorParams;
use ruleforge::corpus::{Corpus, TrainingInstance};
use ruleforge::dictionary::TokenDictionary;
use ruleforge::error::GrammarResult;
use ruleforge::grammar::{Grammar, OutputFormat};
use ruleforge::model::{BaseMeasure, DistributedRuleCounts, RuleCounts};
use ruleforge::rule::Rule;
use ruleforge::sampler::{EpochReport, NoProgress, ProgressCallback, Sampler, SamplerOptions, Selection};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

const TREES: [&str; 6] = [
    "(S (NP (DT the) (NN dog)) (VP (VBZ barks)))",
    "(S (NP (DT the) (NN cat)) (VP (VBZ sleeps)))",
    "(S (NP (DT a) (JJ big) (NN dog)) (VP (VBZ sleeps)))",
    "(S (NP (NNP john)) (VP (VBZ sees) (NP (DT the) (NN cat))))",
    "(())",
    "(S (NP (PRP it)) (VP (VBZ barks) (ADVP (RB loudly))))",
];
const STRINGS: [&str; 6] = [
    "el perro ladra",
    "el gato duerme",
    "un perro grande duerme",
    "juan ve al gato",
    "nada",
    "ladra fuerte",
];
const ALIGNMENTS: [&str; 6] = ["0-0 1-1 2-2", "0-0 1-1 2-2", "0-0 1-2 2-1 3-3", "0-0 1-1 2-2 3-3", "", "1-0 2-1"];

fn corpus(dict: &mut TokenDictionary) -> Corpus {
    Corpus::from_lines(&TREES, &STRINGS, &ALIGNMENTS, dict).unwrap()
}

fn recount(instances: &[TrainingInstance], alpha: f64) -> RuleCounts {
    let mut counts = RuleCounts::new(alpha);
    for instance in instances {
        for rule in instance.rules().unwrap() {
            counts.increment(&rule);
        }
    }
    counts
}

fn sample(seed: u64, threads: usize, epochs: usize) -> (String, TokenDictionary) {
    let mut dict = TokenDictionary::new();
    let corpus = corpus(&mut dict);
    let base = BaseMeasure::geometric(&corpus.instances, &PriorParams::default());
    let options = SamplerOptions::builder()
        .num_threads(threads)
        .epochs(epochs)
        .seed(Some(seed))
        .build();
    let mut sampler = Sampler::new(corpus.instances, base, options).unwrap();
    sampler.run(&NoProgress).unwrap();
    let grammar = Grammar::from_counts(sampler.counts(), 0, &dict).unwrap();
    (grammar.fingerprint(OutputFormat::Stsg, &dict).unwrap(), dict)
}

#[test]
fn test_single_thread_run_is_reproducible() {
    let (a, _) = sample(42, 1, 8);
    let (b, _) = sample(42, 1, 8);
    assert_eq!(a, b);
}

#[test]
fn test_counts_match_annotations_after_parallel_run() {
    let mut dict = TokenDictionary::new();
    let corpus = corpus(&mut dict);
    let base = BaseMeasure::geometric(&corpus.instances, &PriorParams::default());
    let options = SamplerOptions::builder().num_threads(3).epochs(6).alpha(0.5).build();
    let mut sampler = Sampler::new(corpus.instances, base, options).unwrap();
    let reports = sampler.run(&NoProgress).unwrap();

    assert_eq!(reports.len(), 6);
    assert_eq!(sampler.counts(), &recount(sampler.instances(), 0.5));
    // every non-failure tree still derives from its root
    for instance in sampler.instances().iter().filter(|i| !i.is_parse_failure()) {
        assert!(instance.tree.is_split(0));
    }
    assert!(sampler.instances()[4].rules().unwrap().is_empty());
}

#[test]
fn test_viterbi_run_keeps_counts_consistent() {
    let mut dict = TokenDictionary::new();
    let corpus = corpus(&mut dict);
    let base = BaseMeasure::geometric(&corpus.instances, &PriorParams::default());
    let options = SamplerOptions::builder()
        .num_threads(2)
        .epochs(3)
        .selection(Selection::Viterbi)
        .swaps(false)
        .seed(Some(3))
        .build();
    let mut sampler = Sampler::new(corpus.instances, base, options).unwrap();
    let reports = sampler.run(&NoProgress).unwrap();
    assert!(reports.iter().all(|r| r.moves.swap_moves == 0));
    assert_eq!(sampler.counts(), &recount(sampler.instances(), 1.0));
}

struct Counter(AtomicUsize);

impl ProgressCallback for Counter {
    fn on_epoch(&self, report: &EpochReport, counts: &RuleCounts, instances: &[TrainingInstance]) -> GrammarResult<()> {
        let seen = self.0.fetch_add(1, Ordering::SeqCst) + 1;
        assert_eq!(report.epoch, seen);
        assert_eq!(report.grammar.total_rules, counts.total());
        assert_eq!(instances.len(), TREES.len());
        Ok(())
    }
}

#[test]
fn test_callback_sees_every_epoch() {
    let mut dict = TokenDictionary::new();
    let corpus = corpus(&mut dict);
    let base = BaseMeasure::geometric(&corpus.instances, &PriorParams::default());
    let options = SamplerOptions::builder().num_threads(2).epochs(4).seed(Some(9)).build();
    let mut sampler = Sampler::new(corpus.instances, base, options).unwrap();
    let counter = Counter(AtomicUsize::new(0));
    sampler.run(&counter).unwrap();
    assert_eq!(counter.0.load(Ordering::SeqCst), 4);
}

fn rule_pool(dict: &mut TokenDictionary) -> Vec<Rule> {
    let corpus = Corpus::from_lines(
        &["(NN a)", "(NN b)", "(VB c)", "(VB a)", "(JJ d)"],
        &["x", "y", "z", "x", "w"],
        &["0-0", "0-0", "0-0", "0-0", "0-0"],
        dict,
    )
    .unwrap();
    corpus.instances.iter().map(|i| i.rule_at(0).unwrap()).collect()
}

proptest! {
    #[test]
    fn prop_synchronize_is_exact(
        seeded in prop::collection::vec(0usize..5, 0..12),
        ops in prop::collection::vec((0usize..3, 0usize..5, any::<bool>()), 0..40),
    ) {
        let mut dict = TokenDictionary::new();
        let pool = rule_pool(&mut dict);
        let mut counts = DistributedRuleCounts::new(3, 1.0);
        counts.seed(seeded.iter().map(|&i| &pool[i]));

        let mut expected: BTreeMap<usize, i64> = BTreeMap::new();
        for &i in &seeded {
            *expected.entry(i).or_insert(0) += 1;
        }
        for (shard, i, increment) in ops {
            let rule = &pool[i];
            if increment {
                counts.shards_mut()[shard].increment(rule);
                *expected.entry(i).or_insert(0) += 1;
            } else if counts.shard(shard).count(rule) > 0 && expected[&i] > 0 {
                counts.shards_mut()[shard].decrement(rule);
                *expected.entry(i).or_insert(0) -= 1;
            }
        }

        counts.synchronize();
        for (i, rule) in pool.iter().enumerate() {
            prop_assert_eq!(counts.snapshot().count(rule), expected.get(&i).copied().unwrap_or(0));
        }
        for shard in 0..3 {
            prop_assert_eq!(counts.shard(shard), counts.snapshot());
        }
    }
}
