#![allow(non_snake_case)]

use alloy::primitives::{
    Address,
    U256,
};
use coinflip_client::{
    client::{
        AppController,
        InputReceiver,
    },
    contract::Side,
    events::Resolution,
    sync::{
        Phase,
        UserAction,
    },
    test_helpers::{
        FakeChain,
        test_config,
    },
};
use std::time::Duration;

type Controller = AppController<FakeChain, FakeChain>;

const MAX_STEPS: usize = 100;

fn player() -> Address {
    Address::repeat_byte(0xaa)
}

fn opponent() -> Address {
    Address::repeat_byte(0xbb)
}

fn controller_with_wallet(fake: &FakeChain) -> (Controller, InputReceiver) {
    AppController::new(test_config(), fake.clone(), Some(fake.clone()))
}

async fn drive_until(
    controller: &mut Controller,
    inputs: &mut InputReceiver,
    done: impl Fn(&Controller) -> bool,
) {
    for _ in 0..MAX_STEPS {
        if done(controller) {
            return;
        }
        let input = tokio::time::timeout(Duration::from_secs(60), inputs.recv())
            .await
            .unwrap_or_else(|_| panic!("stalled in phase {}", controller.phase()))
            .expect("input channel open");
        controller.handle(input);
    }
    panic!("condition not reached, phase {}", controller.phase());
}

/// Lets worker tasks run for `period` and feeds whatever they produced.
async fn drain_for(controller: &mut Controller, inputs: &mut InputReceiver, period: Duration) {
    tokio::time::sleep(period).await;
    while let Ok(input) = inputs.try_recv() {
        controller.handle(input);
    }
}

#[tokio::test(start_paused = true)]
async fn start__loads_open_games() {
    // given
    let fake = FakeChain::new(player());
    let first = fake.open_game(opponent());
    let second = fake.open_game(opponent());
    let (mut controller, mut inputs) = controller_with_wallet(&fake);

    // when
    controller.start();
    drive_until(&mut controller, &mut inputs, |c| !c.snapshot().open_games.is_empty()).await;

    // then
    assert_eq!(controller.snapshot().open_games, vec![first, second]);
    assert_eq!(controller.phase(), Phase::Lobby);
}

#[tokio::test(start_paused = true)]
async fn creator__plays_a_full_game_and_wins() {
    // given
    let fake = FakeChain::new(player());
    let (mut controller, mut inputs) = controller_with_wallet(&fake);
    controller.start();

    // when
    controller.dispatch(UserAction::CreateGame);
    drive_until(&mut controller, &mut inputs, |c| c.phase() == Phase::Waiting).await;

    // then
    let game_id = controller.snapshot().game_id.expect("game id from GameCreated");
    assert_eq!(controller.polling(), Some(game_id));

    // when
    fake.join_as(game_id, opponent());
    drive_until(&mut controller, &mut inputs, |c| c.phase() == Phase::Choose).await;

    // then
    assert_eq!(controller.polling(), None);

    // given
    let resolution = Resolution {
        game_id,
        winner: player(),
        winning_choice: U256::from(1),
    };
    fake.resolve_on_choice(resolution);

    // when
    controller.dispatch(UserAction::MakeChoice(Side::White));
    drive_until(&mut controller, &mut inputs, |c| c.phase() == Phase::Result).await;

    // then
    let snapshot = controller.snapshot();
    assert_eq!(snapshot.winner_info, Some(resolution.describe()));
    assert!(resolution.describe().starts_with("Winner: White"));
    assert_eq!(controller.polling(), None);
    assert_eq!(fake.game(game_id).map(|g| g.choice1), Some(Side::White.code()));
}

#[tokio::test(start_paused = true)]
async fn joiner__sees_draw_found_through_poll_and_log_lookup() {
    // given
    let fake = FakeChain::new(player());
    let game_id = fake.open_game(opponent());
    let (mut controller, mut inputs) = controller_with_wallet(&fake);

    // when
    controller.dispatch(UserAction::JoinGame(game_id));

    // then
    assert_eq!(controller.phase(), Phase::Joined);
    assert_eq!(controller.snapshot().game_id, Some(game_id));

    // when
    drive_until(&mut controller, &mut inputs, |c| c.phase() == Phase::Choose).await;
    controller.dispatch(UserAction::MakeChoice(Side::Black));
    drain_for(&mut controller, &mut inputs, Duration::from_millis(350)).await;

    // then
    assert_eq!(controller.phase(), Phase::WaitingChoice);

    // when
    fake.resolve_externally(Resolution {
        game_id,
        winner: Address::ZERO,
        winning_choice: U256::from(1),
    });
    drive_until(&mut controller, &mut inputs, |c| {
        c.snapshot().winner_info.is_some()
    })
    .await;

    // then
    let snapshot = controller.snapshot();
    assert_eq!(snapshot.phase, Phase::Result);
    assert_eq!(snapshot.winner_info.as_deref(), Some("Draw! Bets returned."));
    assert_eq!(controller.polling(), None);
}

#[tokio::test(start_paused = true)]
async fn play_again__returns_to_lobby_with_cleared_game() {
    // given
    let fake = FakeChain::new(player());
    let game_id = fake.open_game(opponent());
    let (mut controller, mut inputs) = controller_with_wallet(&fake);
    controller.dispatch(UserAction::JoinGame(game_id));
    drive_until(&mut controller, &mut inputs, |c| c.phase() == Phase::Choose).await;
    fake.resolve_on_choice(Resolution {
        game_id,
        winner: opponent(),
        winning_choice: U256::from(2),
    });
    controller.dispatch(UserAction::MakeChoice(Side::White));
    drive_until(&mut controller, &mut inputs, |c| c.phase() == Phase::Result).await;

    // when
    controller.dispatch(UserAction::PlayAgain);

    // then
    let snapshot = controller.snapshot();
    assert_eq!(snapshot.phase, Phase::Lobby);
    assert_eq!(snapshot.game_id, None);
    assert_eq!(snapshot.winner_info, None);
}

#[tokio::test(start_paused = true)]
async fn polling__read_failures_are_tolerated_until_the_node_recovers() {
    // given
    let fake = FakeChain::new(player());
    let game_id = fake.open_game(opponent());
    let (mut controller, mut inputs) = controller_with_wallet(&fake);
    fake.fail_reads(Some("node unavailable"));

    // when
    controller.dispatch(UserAction::JoinGame(game_id));
    drain_for(&mut controller, &mut inputs, Duration::from_millis(550)).await;

    // then
    assert_eq!(controller.phase(), Phase::Joined);
    assert!(controller.errors().is_empty());
    assert_eq!(controller.polling(), Some(game_id));

    // when
    fake.fail_reads(None);
    drive_until(&mut controller, &mut inputs, |c| c.phase() == Phase::Choose).await;

    // then
    assert_eq!(controller.polling(), None);
}

#[tokio::test(start_paused = true)]
async fn dispatch__write_without_wallet_is_refused() {
    // given
    let fake = FakeChain::new(player());
    let (mut controller, _inputs) =
        Controller::new(test_config(), fake.clone(), None::<FakeChain>);

    // when
    controller.dispatch(UserAction::CreateGame);

    // then
    assert_eq!(controller.phase(), Phase::Lobby);
    assert!(fake.submitted().is_empty());
    assert_eq!(controller.errors(), ["No wallet connected".to_string()]);
    assert_eq!(controller.account(), None);
}

#[tokio::test(start_paused = true)]
async fn toggle_wallet__disconnected_wallet_cannot_submit() {
    // given
    let fake = FakeChain::new(player());
    let (mut controller, _inputs) = controller_with_wallet(&fake);
    assert_eq!(controller.account(), Some(player()));

    // when
    controller.toggle_wallet();
    controller.dispatch(UserAction::CreateGame);

    // then
    assert_eq!(controller.account(), None);
    assert!(fake.submitted().is_empty());
    assert_eq!(controller.errors().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn submission_failure__is_reported_without_a_transition() {
    // given
    let fake = FakeChain::new(player());
    let game_id = fake.open_game(opponent());
    let (mut controller, mut inputs) = controller_with_wallet(&fake);
    fake.fail_submissions(Some("user rejected"));

    // when
    controller.dispatch(UserAction::JoinGame(game_id));
    drive_until(&mut controller, &mut inputs, |c| !c.errors().is_empty()).await;

    // then
    assert_eq!(controller.phase(), Phase::Joined);
    let error = &controller.errors()[0];
    assert!(error.contains("user rejected"), "{error}");
}

#[tokio::test(start_paused = true)]
async fn reverted_create__stays_in_lobby() {
    // given
    let fake = FakeChain::new(player());
    let (mut controller, mut inputs) = controller_with_wallet(&fake);
    fake.revert_transactions(true);

    // when
    controller.dispatch(UserAction::CreateGame);
    drive_until(&mut controller, &mut inputs, |c| !c.errors().is_empty()).await;

    // then
    assert_eq!(controller.phase(), Phase::Lobby);
    assert!(controller.errors()[0].contains("reverted"));
    assert_eq!(controller.polling(), None);
}

#[tokio::test(start_paused = true)]
async fn shutdown__stops_the_poll_task() {
    // given
    let fake = FakeChain::new(player());
    let game_id = fake.open_game(opponent());
    let (mut controller, _inputs) = controller_with_wallet(&fake);
    controller.dispatch(UserAction::JoinGame(game_id));
    assert_eq!(controller.polling(), Some(game_id));

    // when
    controller.shutdown();

    // then
    assert_eq!(controller.polling(), None);
}
