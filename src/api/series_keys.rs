//! Fundamentals time-series keys, without their `annual` / `quarterly` / `trailing` prefix.

use crate::models::StatementKind;

pub const INCOME_STATEMENT: &[&str] = &[
    "TotalRevenue",
    "OperatingRevenue",
    "CostOfRevenue",
    "GrossProfit",
    "OperatingExpense",
    "SellingGeneralAndAdministration",
    "ResearchAndDevelopment",
    "OperatingIncome",
    "NetNonOperatingInterestIncomeExpense",
    "InterestIncome",
    "InterestExpense",
    "NetInterestIncome",
    "OtherIncomeExpense",
    "PretaxIncome",
    "TaxProvision",
    "NetIncomeContinuousOperations",
    "NetIncomeIncludingNoncontrollingInterests",
    "NetIncome",
    "NetIncomeCommonStockholders",
    "DilutedNIAvailtoComStockholders",
    "BasicEPS",
    "DilutedEPS",
    "BasicAverageShares",
    "DilutedAverageShares",
    "TotalOperatingIncomeAsReported",
    "TotalExpenses",
    "NetIncomeFromContinuingAndDiscontinuedOperation",
    "NormalizedIncome",
    "EBIT",
    "EBITDA",
    "NormalizedEBITDA",
    "ReconciledCostOfRevenue",
    "ReconciledDepreciation",
    "NetIncomeFromContinuingOperationNetMinorityInterest",
    "TaxRateForCalcs",
    "TaxEffectOfUnusualItems",
];

pub const BALANCE_SHEET: &[&str] = &[
    "TotalAssets",
    "CurrentAssets",
    "CashCashEquivalentsAndShortTermInvestments",
    "CashAndCashEquivalents",
    "OtherShortTermInvestments",
    "Receivables",
    "AccountsReceivable",
    "Inventory",
    "OtherCurrentAssets",
    "TotalNonCurrentAssets",
    "NetPPE",
    "GrossPPE",
    "AccumulatedDepreciation",
    "GoodwillAndOtherIntangibleAssets",
    "Goodwill",
    "InvestmentsAndAdvances",
    "OtherNonCurrentAssets",
    "TotalLiabilitiesNetMinorityInterest",
    "CurrentLiabilities",
    "AccountsPayable",
    "CurrentDebt",
    "CurrentDeferredRevenue",
    "OtherCurrentLiabilities",
    "TotalNonCurrentLiabilitiesNetMinorityInterest",
    "LongTermDebt",
    "CapitalLeaseObligations",
    "TotalEquityGrossMinorityInterest",
    "StockholdersEquity",
    "CommonStockEquity",
    "RetainedEarnings",
    "TotalCapitalization",
    "WorkingCapital",
    "InvestedCapital",
    "TangibleBookValue",
    "NetTangibleAssets",
    "TotalDebt",
    "NetDebt",
    "ShareIssued",
    "OrdinarySharesNumber",
    "TreasurySharesNumber",
];

pub const CASH_FLOW: &[&str] = &[
    "OperatingCashFlow",
    "NetIncomeFromContinuingOperations",
    "DepreciationAndAmortization",
    "DeferredIncomeTax",
    "StockBasedCompensation",
    "ChangeInWorkingCapital",
    "ChangeInReceivables",
    "ChangeInInventory",
    "ChangeInPayablesAndAccruedExpense",
    "InvestingCashFlow",
    "CapitalExpenditure",
    "NetBusinessPurchaseAndSale",
    "PurchaseOfInvestment",
    "SaleOfInvestment",
    "FinancingCashFlow",
    "IssuanceOfDebt",
    "RepaymentOfDebt",
    "NetIssuancePaymentsOfDebt",
    "RepurchaseOfCapitalStock",
    "CashDividendsPaid",
    "BeginningCashPosition",
    "ChangesInCash",
    "EndCashPosition",
    "FreeCashFlow",
    "IncomeTaxPaidSupplementalData",
    "InterestPaidSupplementalData",
];

/// Valuation keys with the label shown on the key-statistics page
pub const VALUATION: &[(&str, &str)] = &[
    ("MarketCap", "Market Cap"),
    ("EnterpriseValue", "Enterprise Value"),
    ("PeRatio", "Trailing P/E"),
    ("ForwardPeRatio", "Forward P/E"),
    ("PegRatio", "PEG Ratio (5yr expected)"),
    ("PsRatio", "Price/Sales"),
    ("PbRatio", "Price/Book"),
    ("EnterprisesValueRevenueRatio", "Enterprise Value/Revenue"),
    ("EnterprisesValueEBITDARatio", "Enterprise Value/EBITDA"),
];

pub fn statement_keys(kind: StatementKind) -> &'static [&'static str] {
    match kind {
        StatementKind::IncomeStatement => INCOME_STATEMENT,
        StatementKind::BalanceSheet => BALANCE_SHEET,
        StatementKind::CashFlow => CASH_FLOW,
    }
}
