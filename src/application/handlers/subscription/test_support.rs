//! Shared fixtures for subscription handler tests.

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::adapters::events::InMemoryEventBus;
use crate::adapters::memory::{
    InMemoryBillingCatalog, InMemoryFacilityDirectory, InMemoryPaymentMethodStore,
    InMemoryReconciliationStore, InMemorySubscriptionRepository,
};
use crate::adapters::stripe::MockPaymentGateway;
use crate::domain::billing::{BillingInterval, IntervalUnit, Module, Plan};
use crate::domain::foundation::{FacilityId, SubscriptionId, Timestamp};
use crate::domain::subscription::{ProcessorBilling, Subscription};
use crate::ports::{
    BillingCatalog, EventPublisher, FacilityDirectory, PaymentGateway, PaymentMethodStore,
    ProcessorSubscription, ReconciliationStore, SubscriptionChanges, SubscriptionRepository,
};

pub(crate) struct Fixture {
    pub facility_id: FacilityId,
    pub subscriptions: Arc<InMemorySubscriptionRepository>,
    pub ledger: Arc<InMemoryReconciliationStore>,
    pub facilities: Arc<InMemoryFacilityDirectory>,
    pub payment_methods: Arc<InMemoryPaymentMethodStore>,
    pub gateway: Arc<MockPaymentGateway>,
    pub events: Arc<InMemoryEventBus>,
    pub catalog: Arc<InMemoryBillingCatalog>,
    pub resident_monthly: BillingInterval,
    pub staff_monthly: BillingInterval,
    pub staff_yearly: BillingInterval,
    pub trainings_monthly: BillingInterval,
}

fn interval(plan: &Plan, cents: i64, unit: IntervalUnit, processor_plan_id: &str) -> BillingInterval {
    BillingInterval::new(plan.clone(), Decimal::new(cents, 2), unit, 1, processor_plan_id).unwrap()
}

impl Fixture {
    /// Facility "Sunrise Manor" with a signed business agreement.
    pub fn new() -> Self {
        let resident = Plan::new("Resident Plus", Module::Resident, Some(50)).unwrap();
        let staff = Plan::new("Staff", Module::Staff, None).unwrap();
        let trainings = Plan::new("Trainings", Module::Trainings, None).unwrap();
        let resident_monthly = interval(&resident, 9900, IntervalUnit::Month, "resident_monthly");
        let staff_monthly = interval(&staff, 1225, IntervalUnit::Month, "staff_monthly");
        let staff_yearly = interval(&staff, 12000, IntervalUnit::Year, "staff_yearly");
        let trainings_monthly = interval(&trainings, 500, IntervalUnit::Month, "trainings_monthly");

        let facility_id = FacilityId::new();
        let subscriptions = Arc::new(InMemorySubscriptionRepository::new());
        let facilities = Arc::new(InMemoryFacilityDirectory::new());
        facilities.insert(facility_id, "Sunrise Manor", true);

        Self {
            facility_id,
            ledger: Arc::new(InMemoryReconciliationStore::new(subscriptions.clone())),
            subscriptions,
            facilities,
            payment_methods: Arc::new(InMemoryPaymentMethodStore::new()),
            gateway: Arc::new(MockPaymentGateway::new()),
            events: Arc::new(InMemoryEventBus::new()),
            catalog: Arc::new(InMemoryBillingCatalog::new(vec![
                resident_monthly.clone(),
                staff_monthly.clone(),
                staff_yearly.clone(),
                trainings_monthly.clone(),
            ])),
            resident_monthly,
            staff_monthly,
            staff_yearly,
            trainings_monthly,
        }
    }

    pub fn without_agreement(self) -> Self {
        self.facilities.insert(self.facility_id, "Sunrise Manor", false);
        self
    }

    pub fn repository(&self) -> Arc<dyn SubscriptionRepository> {
        self.subscriptions.clone()
    }

    pub fn store(&self) -> Arc<dyn ReconciliationStore> {
        self.ledger.clone()
    }

    pub fn catalog(&self) -> Arc<dyn BillingCatalog> {
        self.catalog.clone()
    }

    pub fn directory(&self) -> Arc<dyn FacilityDirectory> {
        self.facilities.clone()
    }

    pub fn methods(&self) -> Arc<dyn PaymentMethodStore> {
        self.payment_methods.clone()
    }

    pub fn payment_gateway(&self) -> Arc<dyn PaymentGateway> {
        self.gateway.clone()
    }

    pub fn publisher(&self) -> Arc<dyn EventPublisher> {
        self.events.clone()
    }

    /// Store a trial that started `days_ago` days ago.
    pub async fn trial(&self, interval: &BillingInterval, days_ago: i64) -> Subscription {
        let started = Timestamp::now().add_days(-days_ago);
        let trial = Subscription::start_trial(self.facility_id, interval, started, 30);
        self.subscriptions.save(&trial).await.unwrap();
        trial
    }

    /// Store an active subscription that also exists at the mock processor.
    pub async fn active(&self, interval: &BillingInterval, processor_id: &str) -> Subscription {
        let now = Timestamp::now();
        self.gateway.add_subscription(ProcessorSubscription {
            id: processor_id.to_string(),
            status: "active".to_string(),
            plan_id: Some(interval.processor_plan_id.clone()),
            current_period_start: Some(now),
            current_period_end: Some(now.add_days(30)),
            trial_start: None,
            trial_end: None,
            cancel_at_period_end: false,
            pending: SubscriptionChanges::default(),
        });
        let billing = ProcessorBilling {
            processor_subscription_id: processor_id.to_string(),
            current_period_start: Some(now),
            current_period_end: Some(now.add_days(30)),
            trial_start: None,
            trial_end: None,
        };
        let subscription = Subscription::start_paid(self.facility_id, interval, billing, now);
        self.subscriptions.save(&subscription).await.unwrap();
        subscription
    }

    pub async fn stored(&self, id: SubscriptionId) -> Subscription {
        self.subscriptions.find_by_id(&id).await.unwrap().unwrap()
    }

    pub fn event_types(&self) -> Vec<String> {
        self.events
            .published_events()
            .into_iter()
            .map(|e| e.event_type)
            .collect()
    }
}
