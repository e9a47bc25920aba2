use super::*;
use crate::deferred::CollectingReporter;
use crate::gateway::{GatewayCall, MockGateway};
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use shared::StaticRates;
use shared::models::{Account, ConnectedAccount, GatewayCredentials};
use std::str::FromStr;
use tokio::sync::mpsc::UnboundedReceiver;


const BUYER: &str = "acc-buyer";
const COHOST: &str = "acc-cohost";
const ORGANISER: &str = "org-1";
const COHOST_ORG: &str = "org-2";

struct Harness {
    manager: OrdersManager,
    gateway: MockGateway,
    reporter: CollectingReporter,
    jobs: UnboundedReceiver<DeferredJob>,
}

impl Harness {
    fn storage(&self) -> &OrderStorage {
        self.manager.storage()
    }

    fn drain_jobs(&mut self) -> Vec<DeferredJob> {
        let mut jobs = Vec::new();
        while let Ok(job) = self.jobs.try_recv() {
            jobs.push(job);
        }
        jobs
    }

    /// Give the co-host a payout account with the organiser
    fn add_cohost_payout(&self) {
        let mut os = Organisationship::new(COHOST, ORGANISER);
        os.payout_account = Some(ConnectedAccount {
            user_id: "acct_cohost".into(),
            access_token: "tok_cohost".into(),
        });
        self.storage().store_organisationship(&os).unwrap();
    }

    fn set_buyer_credit(&self, amount: &str) {
        let mut os = Organisationship::new(BUYER, ORGANISER);
        os.credit_balance = Some(shared::Money::new(dec(amount), gbp()));
        self.storage().store_organisationship(&os).unwrap();
    }

    fn buyer_credit(&self) -> Option<Decimal> {
        self.storage()
            .get_organisationship(BUYER, ORGANISER)
            .unwrap()
            .and_then(|os| os.credit_balance)
            .map(|m| m.amount())
    }

    async fn paid_order(&self, request: CreateOrderRequest) -> Order {
        let pi = request.payment_intent.clone().unwrap();
        self.manager.create_order(request).await.unwrap();
        self.manager.confirm_payment(&pi).await.unwrap()
    }
}

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn gbp() -> Currency {
    Currency::parse("GBP").unwrap()
}

fn event() -> Event {
    Event {
        id: "ev-1".into(),
        name: "Spring Gathering".into(),
        organisation_id: ORGANISER.into(),
        starts_at: Utc.with_ymd_and_hms(2026, 3, 14, 19, 30, 0).unwrap(),
        location: Some("Town Hall".into()),
        currency: gbp(),
        organisation_revenue_share: None,
        revenue_sharer_id: None,
        cohost_ids: vec![COHOST_ORG.into()],
        no_discounts: false,
        refund_deleted_orders: true,
        send_order_notifications: true,
        minimum_donation: None,
    }
}

/// Event whose co-host keeps 20% of ticket revenue
fn shared_event() -> Event {
    Event {
        organisation_revenue_share: Some(dec("0.8")),
        revenue_sharer_id: Some(COHOST.into()),
        ..event()
    }
}

fn harness_with(event: Event) -> Harness {
    let storage = OrderStorage::open_in_memory().unwrap();
    storage.store_event(&event).unwrap();
    storage
        .store_organisation(&Organisation {
            id: ORGANISER.into(),
            slug: "the-organiser".into(),
            name: "The Organiser".into(),
            gateway: Some(GatewayCredentials {
                secret_key: "sk_org".into(),
            }),
        })
        .unwrap();
    storage
        .store_organisation(&Organisation {
            id: COHOST_ORG.into(),
            slug: "cohost-collective".into(),
            name: "Cohost Collective".into(),
            gateway: None,
        })
        .unwrap();
    for (id, name) in [(BUYER, "Ada Buyer"), (COHOST, "Cy Cohost")] {
        storage
            .store_account(&Account {
                id: id.into(),
                name: name.into(),
                email: None,
            })
            .unwrap();
    }

    let gateway = MockGateway::new();
    let reporter = CollectingReporter::new();
    let (jobs, rx) = JobQueue::new();
    let manager = OrdersManager::new(
        storage,
        Arc::new(gateway.clone()),
        Arc::new(StaticRates::new()),
        jobs,
    )
    .with_reporter(Arc::new(reporter.clone()));

    Harness {
        manager,
        gateway,
        reporter,
        jobs: rx,
    }
}

fn harness() -> Harness {
    harness_with(event())
}

fn request(tickets: &[&str], donation: Option<&str>, payment_intent: &str) -> CreateOrderRequest {
    CreateOrderRequest {
        event_id: "ev-1".into(),
        account_id: BUYER.into(),
        tickets: tickets
            .iter()
            .map(|price| TicketInput::priced("Standard", dec(price)))
            .collect(),
        donations: donation
            .map(|amount| DonationInput { amount: dec(amount) })
            .into_iter()
            .collect(),
        payment_intent: Some(payment_intent.into()),
        ..Default::default()
    }
}

fn job_names(jobs: &[DeferredJob]) -> Vec<&'static str> {
    jobs.iter().map(DeferredJob::name).collect()
}
