//! Concurrency and edge-case tests for the ballot transaction
//!
//! These hammer the shared election from many tasks at once and check that:
//! - one code casts at most one ballot
//! - concurrent ballots never lose a tally increment
//! - concurrent registrations never hand out the same code
//! - rejected ballots leave no trace

use ballot::{
    BallotLine, CandidateProfile, Election, ElectionConfig, Error, NewVoter, RequestContext,
    Result, election::settings::VOTING_ENABLED,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

// =============================================================================
// HELPERS
// =============================================================================

fn admin() -> RequestContext {
    RequestContext::admin("returning-officer", true)
}

fn open_election() -> Result<Election> {
    let election = Election::for_testing()?;
    election.settings().set(&admin(), VOTING_ENABLED, true)?;
    Ok(election)
}

fn register_many(election: &Election, count: usize) -> Result<Vec<String>> {
    let fields = (0..count)
        .map(|i| NewVoter::new("", format!("Voter{i}"), "Test", "other"))
        .collect();
    Ok(election
        .voters()
        .bulk_register(&admin(), fields)?
        .into_iter()
        .map(|v| v.code.as_str().to_string())
        .collect())
}

// =============================================================================
// CONCURRENT OPERATIONS TESTS
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_ballots_with_same_code() -> Result<()> {
    println!("🏁 Testing concurrent ballots with one code...");

    let election = open_election()?;
    let jane = election.candidates().create(
        &admin(),
        CandidateProfile::new("", "Jane", "Doe", "President"),
    )?;
    let jane_id = jane.id;
    let code = register_many(&election, 1)?.remove(0);

    let success_count = Arc::new(Mutex::new(0));
    let already_voted_count = Arc::new(Mutex::new(0));
    let mut handles = Vec::new();

    for _ in 0..20 {
        let election = election.clone();
        let code = code.clone();
        let success_count = success_count.clone();
        let already_voted_count = already_voted_count.clone();

        let handle = tokio::spawn(async move {
            match election.submit_ballot(&code, &[BallotLine::new(jane_id, "President")]) {
                Ok(_) => *success_count.lock().unwrap() += 1,
                Err(Error::AlreadyVoted) => *already_voted_count.lock().unwrap() += 1,
                Err(e) => panic!("Unexpected ballot failure: {e}"),
            }
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.await.unwrap();
    }

    let final_success = *success_count.lock().unwrap();
    let final_already_voted = *already_voted_count.lock().unwrap();
    println!("   Accepted: {final_success}, rejected: {final_already_voted}");

    assert_eq!(final_success, 1);
    assert_eq!(final_already_voted, 19);

    let jane = election.candidates().get(jane.id)?.expect("candidate exists");
    assert_eq!(jane.vote_count, 1);
    assert_eq!(election.ledger().len()?, 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_ballots_lose_no_increments() -> Result<()> {
    println!("🏁 Testing concurrent ballots from distinct voters...");

    let election = open_election()?;
    let jane = election.candidates().create(
        &admin(),
        CandidateProfile::new("", "Jane", "Doe", "President"),
    )?;
    let mary = election.candidates().create(
        &admin(),
        CandidateProfile::new("", "Mary", "Poe", "Secretary"),
    )?;
    let (jane_id, mary_id) = (jane.id, mary.id);
    let codes = register_many(&election, 100)?;

    let mut handles = Vec::new();
    for code in codes {
        let election = election.clone();
        handles.push(tokio::spawn(async move {
            election.submit_ballot(
                &code,
                &[
                    BallotLine::new(jane_id, "President"),
                    BallotLine::new(mary_id, "Secretary"),
                ],
            )
        }));
    }
    for handle in handles {
        handle.await.unwrap()?;
    }

    for id in [jane_id, mary_id] {
        let candidate = election.candidates().get(id)?.expect("candidate exists");
        assert_eq!(candidate.vote_count, 100);
    }
    assert_eq!(election.ledger().len()?, 200);
    assert!(election.results().consistency_report(&admin())?.is_consistent());
    assert!(election.ledger().verify_chain()?.is_intact());
    assert!(election.audit().verify_chain()?.is_intact());

    let stats = election.voters().stats(&admin())?;
    assert_eq!(stats.voted_count, 100);
    assert_eq!(stats.turnout_percentage, 100.0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registrations_issue_unique_codes() -> Result<()> {
    let election = Election::for_testing()?;

    let mut handles = Vec::new();
    for task in 0..8 {
        let election = election.clone();
        handles.push(tokio::spawn(async move {
            let mut codes = Vec::new();
            for i in 0..50 {
                let voter = election.voters().register(
                    &admin(),
                    NewVoter::new("", format!("Task{task}"), format!("Voter{i}"), "other"),
                )?;
                codes.push(voter.code);
            }
            Ok::<_, Error>(codes)
        }));
    }

    let mut all_codes = HashSet::new();
    for handle in handles {
        for code in handle.await.unwrap()? {
            assert!(all_codes.insert(code), "code issued twice");
        }
    }
    assert_eq!(all_codes.len(), 400);
    assert_eq!(election.voters().stats(&admin())?.total_voters, 400);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_position_edit_racing_ballots() -> Result<()> {
    let election = open_election()?;
    let jane = election.candidates().create(
        &admin(),
        CandidateProfile::new("", "Jane", "Doe", "President"),
    )?;
    let jane_id = jane.id;
    let codes = register_many(&election, 50)?;

    let mover = {
        let election = election.clone();
        tokio::spawn(async move {
            election.candidates().update(
                &admin(),
                jane_id,
                CandidateProfile::new("", "Jane", "Doe", "Treasurer"),
            )
        })
    };

    let mut handles = Vec::new();
    for code in codes {
        let election = election.clone();
        handles.push(tokio::spawn(async move {
            election.submit_ballot(&code, &[BallotLine::new(jane_id, "President")])
        }));
    }

    mover.await.unwrap()?;
    let mut accepted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(Error::PositionMismatch { .. }) => {}
            Err(e) => panic!("Unexpected ballot failure: {e}"),
        }
    }

    // Every accepted ballot was validated against the position it was cast for
    let jane = election.candidates().get(jane_id)?.expect("candidate exists");
    assert_eq!(jane.position, "Treasurer");
    assert_eq!(jane.vote_count, accepted);
    assert_eq!(election.ledger().len()?, accepted as usize);
    assert!(election.results().consistency_report(&admin())?.is_consistent());
    Ok(())
}

// =============================================================================
// REJECTION EDGE CASES
// =============================================================================

#[tokio::test]
async fn test_rejected_ballots_leave_no_trace() -> Result<()> {
    let election = open_election()?;
    let jane = election.candidates().create(
        &admin(),
        CandidateProfile::new("", "Jane", "Doe", "President"),
    )?;
    let code = register_many(&election, 1)?.remove(0);
    let audit_before = election.audit().len()?;

    let ballots = [
        vec![
            BallotLine::new(jane.id, "President"),
            BallotLine::new(jane.id, "President"),
        ],
        vec![
            BallotLine::new(jane.id, "President"),
            BallotLine::new(Uuid::new_v4(), "Secretary"),
        ],
        vec![BallotLine::new(jane.id, "Secretary")],
    ];
    for ballot in &ballots {
        assert!(election.submit_ballot(&code, ballot).is_err());
    }

    assert_eq!(election.audit().len()?, audit_before);
    assert!(election.ledger().is_empty()?);
    let jane = election.candidates().get(jane.id)?.expect("candidate exists");
    assert_eq!(jane.vote_count, 0);

    // The voter can still cast a valid ballot afterwards
    let receipt = election.submit_ballot(&code, &[BallotLine::new(jane.id, "President")])?;
    assert_eq!(receipt.count, 1);
    Ok(())
}

#[tokio::test]
async fn test_malformed_codes() -> Result<()> {
    let election = open_election()?;
    let too_long = "A".repeat(40);
    for code in ["", "   ", "AB", "ABCD-1234", too_long.as_str()] {
        let result = election.submit_ballot(code, &[]);
        assert!(matches!(result, Err(Error::InvalidCode)), "code {code:?}");
        assert!(election.lookup_by_code(code)?.is_none());
    }
    Ok(())
}

#[tokio::test]
async fn test_code_space_exhaustion() -> Result<()> {
    let config = ElectionConfig {
        code_length: 4,
        code_alphabet: "ABCDEFGHJKLMNPQR".to_string(),
        max_code_attempts: 1,
        ..ElectionConfig::for_testing()
    };
    let election = Election::new(&config)?;

    // 16^4 codes with a single attempt each: collisions show up well
    // before the space fills.
    let mut exhausted = false;
    for i in 0..5_000 {
        match election
            .voters()
            .register(&admin(), NewVoter::new("", format!("V{i}"), "Test", "other"))
        {
            Ok(_) => {}
            Err(Error::CodeSpaceExhausted { attempts }) => {
                assert_eq!(attempts, 1);
                exhausted = true;
                break;
            }
            Err(e) => panic!("Unexpected registration failure: {e}"),
        }
    }
    assert!(exhausted);
    Ok(())
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let config = ElectionConfig {
        code_alphabet: "ABC".to_string(),
        ..ElectionConfig::for_testing()
    };
    assert!(matches!(Election::new(&config), Err(Error::Validation { .. })));
}

#[tokio::test]
async fn test_configs_that_would_issue_unusable_codes_are_rejected() {
    let lower_case = ElectionConfig {
        code_alphabet: "abcdefghjkmnpqrstuvwxyz2345678".to_string(),
        ..ElectionConfig::for_testing()
    };
    assert!(matches!(Election::new(&lower_case), Err(Error::Validation { .. })));

    let too_long = ElectionConfig {
        code_length: 40,
        ..ElectionConfig::for_testing()
    };
    assert!(matches!(Election::new(&too_long), Err(Error::Validation { .. })));
}

#[tokio::test]
async fn test_every_generated_code_can_vote() -> Result<()> {
    let config = ElectionConfig {
        code_length: ballot::types::MAX_CODE_LEN,
        ..ElectionConfig::for_testing()
    };
    let election = Election::new(&config)?;
    election.settings().set(&admin(), VOTING_ENABLED, true)?;

    let voter = election
        .voters()
        .register(&admin(), NewVoter::new("", "Long", "Code", "other"))?;
    assert_eq!(voter.code.as_str().len(), ballot::types::MAX_CODE_LEN);

    let lowered = voter.code.as_str().to_lowercase();
    assert!(election.lookup_by_code(&lowered)?.is_some());
    let receipt = election.submit_ballot(&lowered, &[])?;
    assert!(receipt.success);
    Ok(())
}
